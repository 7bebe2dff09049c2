use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use crate::providers::{ToolSpec, TranslationRequest};

pub const TOOL_NAME: &str = "deliver_translation";

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("prompts/system_prompt.tera");

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub source_lang: String,
    pub lang: String,
}

impl TranslateOptions {
    pub fn new(source_lang: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into(),
            lang: lang.into(),
        }
    }
}

pub fn tool_spec(tool_name: &str) -> ToolSpec {
    let parameters = json!({
        "type": "object",
        "properties": {
            "translation": {"type": "string"},
            "source_language": {"type": "string"},
            "target_language": {"type": "string"}
        },
        "required": ["translation", "source_language", "target_language"]
    });

    ToolSpec {
        name: tool_name.to_string(),
        description: "Return the translated chart label.".to_string(),
        parameters,
    }
}

pub fn render_system_prompt(options: &TranslateOptions, tool_name: &str) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_lang", options.source_lang.trim());
    context.insert("target_lang", options.lang.trim());
    context.insert("tool_name", tool_name);

    Tera::one_off(SYSTEM_PROMPT_TEMPLATE, &context, false)
        .with_context(|| "failed to render system prompt")
}

/// Validates the tool arguments of a chat backend and returns the translation.
pub fn parse_tool_args(value: Value, request: &TranslationRequest) -> Result<String> {
    let args: ToolArgs =
        serde_json::from_value(value).with_context(|| "invalid tool arguments")?;

    if args.translation.trim().is_empty() {
        return Err(anyhow!("translation is empty"));
    }
    if let Some(target) = args.target_language.as_deref() {
        if !target.trim().is_empty() && !eq_insensitive(target, &request.target_lang) {
            return Err(anyhow!(
                "tool response target_language mismatch (expected '{}', got '{}')",
                request.target_lang,
                target
            ));
        }
    }
    Ok(args.translation.trim().to_string())
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    translation: String,
    #[serde(default)]
    target_language: Option<String>,
}

fn eq_insensitive(left: &str, right: &str) -> bool {
    left.trim().eq_ignore_ascii_case(right.trim())
}
