use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::translations::{self, TOOL_NAME, TranslateOptions, tool_spec};

mod claude;
mod gemini;
mod google;
mod http;
mod openai;

pub use claude::Claude;
pub use gemini::Gemini;
pub use google::Google;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    OpenAI,
    Gemini,
    Claude,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Claude => "claude",
        }
    }

    fn requires_key(&self) -> bool {
        !matches!(self, ProviderKind::Google)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub provider: ProviderKind,
    pub requested_model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslationRequest {
    pub fn new(text: &str, options: &TranslateOptions) -> Self {
        Self {
            text: text.to_string(),
            source_lang: options.source_lang.clone(),
            target_lang: options.lang.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub translation: String,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Raw result of a forced tool call on a chat backend.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub args: serde_json::Value,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

pub type ProviderFuture = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send>>;
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<ToolResponse>> + Send>>;

/// A translation backend. Calls may fail transiently; retrying is the
/// caller's business.
pub trait Provider: Clone + Send + Sync {
    fn translate(self, request: TranslationRequest) -> ProviderFuture;
}

/// Chat backends that answer through a single forced tool call.
pub(crate) trait ToolProvider: Clone + Send + Sync + 'static {
    fn append_system_input(self, input: String) -> Self;
    fn append_user_input(self, input: String) -> Self;
    fn register_tool(self, tool: ToolSpec) -> Self;
    fn call_tool(self, tool_name: &str) -> ToolFuture;
}

pub(crate) fn translate_with_tool<T: ToolProvider>(
    provider: T,
    request: TranslationRequest,
) -> ProviderFuture {
    Box::pin(async move {
        let options = TranslateOptions::new(&request.source_lang, &request.target_lang);
        let system_prompt = translations::render_system_prompt(&options, TOOL_NAME)?;
        let response = provider
            .register_tool(tool_spec(TOOL_NAME))
            .append_system_input(system_prompt)
            .append_user_input(request.text.clone())
            .call_tool(TOOL_NAME)
            .await?;
        let translation = translations::parse_tool_args(response.args, &request)?;
        Ok(ProviderResponse {
            translation,
            model: response.model,
            usage: response.usage,
        })
    })
}

#[derive(Debug, Clone, Copy)]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: String) -> Self {
        Self {
            role: MessageRole::System,
            content,
        }
    }

    pub fn user(content: String) -> Self {
        Self {
            role: MessageRole::User,
            content,
        }
    }
}

pub(crate) fn system_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| matches!(message.role, MessageRole::System))
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn user_inputs(messages: &[Message]) -> impl Iterator<Item = &str> {
    messages
        .iter()
        .filter(|message| matches!(message.role, MessageRole::User))
        .map(|message| message.content.as_str())
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    Google(Google),
    OpenAI(OpenAI),
    Gemini(Gemini),
    Claude(Claude),
}

impl ProviderImpl {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderImpl::Google(_) => ProviderKind::Google,
            ProviderImpl::OpenAI(_) => ProviderKind::OpenAI,
            ProviderImpl::Gemini(_) => ProviderKind::Gemini,
            ProviderImpl::Claude(_) => ProviderKind::Claude,
        }
    }
}

impl Provider for ProviderImpl {
    fn translate(self, request: TranslationRequest) -> ProviderFuture {
        match self {
            ProviderImpl::Google(provider) => provider.translate(request),
            ProviderImpl::OpenAI(provider) => provider.translate(request),
            ProviderImpl::Gemini(provider) => provider.translate(request),
            ProviderImpl::Claude(provider) => provider.translate(request),
        }
    }
}

pub fn build_provider(
    selection: &ProviderSelection,
    key: Option<String>,
    timeout: Duration,
) -> Result<ProviderImpl> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .with_context(|| "failed to build HTTP client")?;
    let model = selection.requested_model.clone().unwrap_or_default();

    let provider = match selection.provider {
        ProviderKind::Google => ProviderImpl::Google(Google::new(client)),
        ProviderKind::OpenAI => ProviderImpl::OpenAI(
            OpenAI::new(client, require_key(key, ProviderKind::OpenAI)?).with_model(model),
        ),
        ProviderKind::Gemini => ProviderImpl::Gemini(
            Gemini::new(client, require_key(key, ProviderKind::Gemini)?).with_model(model),
        ),
        ProviderKind::Claude => ProviderImpl::Claude(
            Claude::new(client, require_key(key, ProviderKind::Claude)?).with_model(model),
        ),
    };
    Ok(provider)
}

fn require_key(key: Option<String>, provider: ProviderKind) -> Result<String> {
    key.ok_or_else(|| anyhow!("API key not found for provider {}", provider.as_str()))
}

/// Picks the backend from `--model` (`provider` or `provider:model`), falling
/// back to the configured provider name and model.
pub fn resolve_provider_selection(
    model_arg: Option<&str>,
    configured_provider: &str,
    configured_model: Option<&str>,
) -> Result<ProviderSelection> {
    if let Some(model) = model_arg {
        return parse_model_arg(model);
    }
    let provider = provider_from_name(&configured_provider.trim().to_lowercase())
        .ok_or_else(|| anyhow!("unknown translation provider '{}'", configured_provider))?;
    Ok(ProviderSelection {
        provider,
        requested_model: configured_model
            .map(|model| model.trim().to_string())
            .filter(|model| !model.is_empty()),
    })
}

pub fn resolve_key(provider: ProviderKind, override_key: Option<&str>) -> Result<Option<String>> {
    if !provider.requires_key() {
        return Ok(None);
    }
    if let Some(key) = override_key {
        return Ok(Some(key.to_string()));
    }

    match provider {
        ProviderKind::OpenAI => get_env("OPENAI_API_KEY"),
        ProviderKind::Gemini => get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
        ProviderKind::Claude => get_env("ANTHROPIC_API_KEY"),
        ProviderKind::Google => None,
    }
    .map(Some)
    .ok_or_else(|| anyhow!("API key not found for provider {}", provider.as_str()))
}

fn parse_model_arg(model_arg: &str) -> Result<ProviderSelection> {
    let raw = model_arg.trim();
    if raw.is_empty() {
        return Err(anyhow!("model argument is empty"));
    }

    if let Some(provider) = provider_from_name(&raw.to_lowercase()) {
        return Ok(ProviderSelection {
            provider,
            requested_model: None,
        });
    }

    if let Some((provider_part, model_part)) = raw.split_once(':') {
        if let Some(provider) = provider_from_name(&provider_part.to_lowercase()) {
            let model = model_part.trim();
            return Ok(ProviderSelection {
                provider,
                requested_model: (!model.is_empty()).then(|| model.to_string()),
            });
        }
    }

    Err(anyhow!(
        "unable to infer provider from model '{}'. Use provider:model (google, openai:, gemini:, claude:)",
        raw
    ))
}

fn provider_from_name(name: &str) -> Option<ProviderKind> {
    match name {
        "google" | "googletrans" | "google-translate" => Some(ProviderKind::Google),
        "openai" => Some(ProviderKind::OpenAI),
        "gemini" => Some(ProviderKind::Gemini),
        "claude" | "anthropic" => Some(ProviderKind::Claude),
        _ => None,
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_arg_selects_provider_and_model() {
        let selection = resolve_provider_selection(Some("openai:gpt-4o-mini"), "google", None)
            .unwrap();
        assert_eq!(selection.provider, ProviderKind::OpenAI);
        assert_eq!(selection.requested_model.as_deref(), Some("gpt-4o-mini"));

        let selection = resolve_provider_selection(Some("anthropic"), "google", None).unwrap();
        assert_eq!(selection.provider, ProviderKind::Claude);
        assert_eq!(selection.requested_model, None);

        assert!(resolve_provider_selection(Some("mystery-model"), "google", None).is_err());
    }

    #[test]
    fn configured_provider_is_the_fallback() {
        let selection = resolve_provider_selection(None, "Gemini", Some(" gemini-2.5-flash ")).unwrap();
        assert_eq!(selection.provider, ProviderKind::Gemini);
        assert_eq!(selection.requested_model.as_deref(), Some("gemini-2.5-flash"));

        let selection = resolve_provider_selection(None, "google", Some("")).unwrap();
        assert_eq!(selection.provider, ProviderKind::Google);
        assert_eq!(selection.requested_model, None);

        assert!(resolve_provider_selection(None, "babelfish", None).is_err());
    }

    #[test]
    fn google_needs_no_key() {
        assert_eq!(resolve_key(ProviderKind::Google, Some("ignored")).unwrap(), None);
        assert_eq!(
            resolve_key(ProviderKind::OpenAI, Some("sk-test")).unwrap(),
            Some("sk-test".to_string())
        );
    }
}
