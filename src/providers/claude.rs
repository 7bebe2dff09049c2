use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::http::send_for_text;
use super::{
    Message, Provider, ProviderFuture, ProviderUsage, ToolFuture, ToolProvider, ToolResponse,
    ToolSpec, TranslationRequest, system_text, translate_with_tool, user_inputs,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct Claude {
    client: reqwest::Client,
    key: String,
    model: String,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl Claude {
    pub fn new(client: reqwest::Client, key: impl Into<String>) -> Self {
        Self {
            client,
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }
}

impl Provider for Claude {
    fn translate(self, request: TranslationRequest) -> ProviderFuture {
        translate_with_tool(self, request)
    }
}

impl ToolProvider for Claude {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn register_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    fn call_tool(self, tool_name: &str) -> ToolFuture {
        let tool_name = tool_name.to_string();
        Box::pin(async move {
            let tool = self
                .tools
                .iter()
                .find(|tool| tool.name == tool_name)
                .cloned()
                .ok_or_else(|| anyhow!("tool '{}' not registered", tool_name))?;

            let system = system_text(&self.messages);
            let messages = user_inputs(&self.messages)
                .map(|text| json!({"role": "user", "content": [{"type": "text", "text": text}]}))
                .collect::<Vec<_>>();

            let body = json!({
                "model": self.model,
                "max_tokens": 256,
                "messages": messages,
                "system": if system.trim().is_empty() { json!(null) } else { json!(system) },
                "tools": [
                    {
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters
                    }
                ],
                "tool_choice": {"type": "tool", "name": tool.name}
            });

            let request = self
                .client
                .post(base_url())
                .header("x-api-key", &self.key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body);
            let text = send_for_text("Claude", request).await?;
            extract_tool_response(&text, &tool_name, &self.model)
        })
    }
}

fn base_url() -> String {
    std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_tool_response(text: &str, tool_name: &str, fallback_model: &str) -> Result<ToolResponse> {
    let payload: ClaudeResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Claude response JSON: {}", err))?;
    let block = payload
        .content
        .into_iter()
        .find(|block| block.kind == "tool_use" && block.name.as_deref() == Some(tool_name))
        .ok_or_else(|| anyhow!("no tool call returned from Claude"))?;
    let args = block
        .input
        .ok_or_else(|| anyhow!("Claude tool_use missing input"))?;

    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage
            .input_tokens
            .zip(usage.output_tokens)
            .map(|(input, output)| input + output),
    });
    Ok(ToolResponse { args, model, usage })
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
    model: Option<String>,
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    name: Option<String>,
    input: Option<serde_json::Value>,
}
