use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};

use super::http::send_for_text;
use super::{
    Message, Provider, ProviderFuture, ProviderUsage, ToolFuture, ToolProvider, ToolResponse,
    ToolSpec, TranslationRequest, system_text, translate_with_tool, user_inputs,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Gemini {
    client: reqwest::Client,
    key: String,
    model: String,
    messages: Vec<Message>,
    tools: Vec<ToolSpec>,
}

impl Gemini {
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

impl Provider for Gemini {
    fn translate(self, request: TranslationRequest) -> ProviderFuture {
        translate_with_tool(self, request)
    }
}

impl ToolProvider for Gemini {
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
            let url = format!("{}/{}:generateContent", base_url(), self.model);

            let system_instruction = system_text(&self.messages);
            let contents = user_inputs(&self.messages)
                .map(|text| json!({"role": "user", "parts": [{"text": text}]}))
                .collect::<Vec<_>>();

            let body = json!({
                "contents": contents,
                "systemInstruction": if system_instruction.trim().is_empty() {
                    Value::Null
                } else {
                    json!({"parts": [{"text": system_instruction}]})
                },
                "tools": [
                    {
                        "function_declarations": [
                            {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.parameters
                            }
                        ]
                    }
                ],
                "tool_config": {
                    "function_calling_config": {
                        "mode": "ANY",
                        "allowed_function_names": [tool.name]
                    }
                }
            });

            let request = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.key)
                .json(&body);
            let text = send_for_text("Gemini", request).await?;
            extract_tool_response(&text, &tool_name, &self.model)
        })
    }
}

fn base_url() -> String {
    std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

fn extract_tool_response(text: &str, tool_name: &str, fallback_model: &str) -> Result<ToolResponse> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let candidate = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;

    let function_call = candidate
        .parts
        .iter()
        .filter_map(|part| part.function_call.as_ref())
        .find(|call| call.name == tool_name)
        .ok_or_else(|| anyhow!("no tool call returned from Gemini"))?;

    let model = payload
        .model_version
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage_metadata.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    });
    Ok(ToolResponse {
        args: function_call.args.clone(),
        model,
        usage,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}
