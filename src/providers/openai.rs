use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::http::send_for_text;
use super::{
    Message, MessageRole, Provider, ProviderFuture, ProviderUsage, ToolFuture, ToolProvider,
    ToolResponse, ToolSpec, TranslationRequest, translate_with_tool,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    key: String,
    model: String,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl OpenAI {
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

    fn find_tool(&self, name: &str) -> Result<&ToolSpec> {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| anyhow!("tool '{}' not registered", name))
    }
}

impl Provider for OpenAI {
    fn translate(self, request: TranslationRequest) -> ProviderFuture {
        translate_with_tool(self, request)
    }
}

impl ToolProvider for OpenAI {
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
            let tool = self.find_tool(&tool_name)?.clone();
            let url = format!("{}/chat/completions", base_url());

            let messages = self
                .messages
                .iter()
                .map(|message| {
                    let role = match message.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                    };
                    json!({"role": role, "content": message.content})
                })
                .collect::<Vec<_>>();

            let body = json!({
                "model": self.model,
                "messages": messages,
                "tools": [
                    {
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters
                        }
                    }
                ],
                "tool_choice": {"type": "function", "function": {"name": tool.name}}
            });

            let request = self.client.post(&url).bearer_auth(&self.key).json(&body);
            let text = send_for_text("OpenAI", request).await?;
            extract_tool_response(&text, &tool_name, &self.model)
        })
    }
}

fn base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_tool_response(text: &str, tool_name: &str, fallback_model: &str) -> Result<ToolResponse> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    let tool_call = payload
        .choices
        .first()
        .and_then(|choice| choice.message.tool_calls.first())
        .ok_or_else(|| anyhow!("no tool call returned from OpenAI"))?;

    if tool_call.function.name != tool_name {
        return Err(anyhow!(
            "unexpected tool name '{}' from OpenAI",
            tool_call.function.name
        ));
    }

    let args: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
        .with_context(|| "failed to parse OpenAI tool arguments")?;
    let model = payload
        .model
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    });
    Ok(ToolResponse { args, model, usage })
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}
