use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod annotations;
pub mod annotator;
pub mod batch;
pub mod cache;
pub mod classify;
pub mod error;
pub mod logging;
pub mod overlay;
mod providers;
pub mod settings;
#[cfg(test)]
mod test_util;
pub mod translations;
pub mod translator;

pub use batch::BatchReport;
pub use providers::{
    Claude, Gemini, Google, OpenAI, Provider, ProviderFuture, ProviderKind, ProviderResponse,
    ProviderUsage, TranslationRequest,
};
pub use translations::TranslateOptions;
pub use translator::{RetryPolicy, Translator};

/// Families tried when no font file is configured.
const FALLBACK_FONTS: &[&str] = &[
    "Noto Serif CJK KR",
    "Noto Sans CJK KR",
    "NanumMyeongjo",
    "NanumGothic",
    "Malgun Gothic",
    "Apple SD Gothic Neo",
    "serif",
    "sans-serif",
];

/// Command-line overrides; `None` keeps the value from the settings files.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub source_dir: Option<String>,
    pub target_dir: Option<String>,
    pub source_annotations: Option<String>,
    pub target_annotations: Option<String>,
    pub font: Option<String>,
    pub source_lang: Option<String>,
    pub lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub trailing_comma: bool,
}

pub async fn run(config: Config) -> Result<BatchReport> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config);

    let selection = providers::resolve_provider_selection(
        config.model.as_deref(),
        &settings.provider,
        settings.model.as_deref(),
    )?;
    let key = providers::resolve_key(selection.provider, config.key.as_deref())
        .with_context(|| "no API key found for selected provider")?;
    let provider = providers::build_provider(
        &selection,
        key,
        Duration::from_secs(settings.timeout_secs),
    )?;
    info!(
        "translating {} -> {} with {}",
        settings.source_lang,
        settings.target_lang,
        provider.kind().as_str()
    );

    let translator = Translator::new(
        provider,
        TranslateOptions::new(&settings.source_lang, &settings.target_lang),
    )
    .with_retry(RetryPolicy {
        attempts: settings.attempts,
        delay: Duration::from_millis(settings.retry_delay_ms),
    });
    let style = overlay::OverlayStyle::new(
        &settings.fill_color,
        &settings.text_color,
        settings.font_scale,
    )?;
    let fonts = overlay::FontBook::resolve(
        settings.font_path.as_deref(),
        settings.font_family.as_deref(),
        FALLBACK_FONTS,
    )
    .with_context(|| "failed to load overlay font")?;
    info!("drawing with font family {}", fonts.family());

    let paths = batch::BatchPaths {
        source_dir: settings.source_dir.clone(),
        target_dir: settings.target_dir.clone(),
        source_annotations: settings.source_annotations.clone(),
        target_annotations: settings.target_annotations.clone(),
    };
    batch::run_batch(
        &paths,
        &translator,
        &fonts,
        &style,
        settings.trailing_comma,
    )
    .await
}

fn apply_overrides(settings: &mut settings::Settings, config: &Config) {
    let path = |value: &Option<String>| value.as_deref().map(PathBuf::from);
    if let Some(dir) = path(&config.source_dir) {
        settings.source_dir = dir;
    }
    if let Some(dir) = path(&config.target_dir) {
        settings.target_dir = dir;
    }
    if let Some(file) = path(&config.source_annotations) {
        settings.source_annotations = file;
    }
    if let Some(file) = path(&config.target_annotations) {
        settings.target_annotations = file;
    }
    if let Some(font) = path(&config.font) {
        settings.font_path = Some(font);
    }
    if let Some(lang) = &config.source_lang {
        settings.source_lang = lang.clone();
    }
    if let Some(lang) = &config.lang {
        settings.target_lang = lang.clone();
    }
    if config.trailing_comma {
        settings.trailing_comma = true;
    }
}

/// Human-readable summary printed after a run.
pub fn format_report(report: &BatchReport) -> String {
    let mut lines = vec![format!(
        "translated {}/{} images",
        report.translated, report.total
    )];
    for failure in &report.skipped {
        lines.push(format!("skipped {}: {}", failure.image, failure.message));
    }
    lines.push(format!(
        "model: {}",
        report.model.as_deref().unwrap_or("unavailable")
    ));
    lines.push(format_usage(report.usage.as_ref()));
    lines.join("\n")
}

fn format_usage(usage: Option<&ProviderUsage>) -> String {
    let Some(usage) = usage else {
        return "tokens: unavailable".to_string();
    };
    let total = usage.total_tokens.or_else(|| {
        usage
            .prompt_tokens
            .zip(usage.completion_tokens)
            .map(|(prompt, completion)| prompt + completion)
    });

    let mut parts = Vec::new();
    if let Some(prompt) = usage.prompt_tokens {
        parts.push(format!("prompt={}", prompt));
    }
    if let Some(completion) = usage.completion_tokens {
        parts.push(format!("completion={}", completion));
    }
    if let Some(total) = total {
        parts.push(format!("total={}", total));
    }

    if parts.is_empty() {
        "tokens: unavailable".to_string()
    } else {
        format!("tokens: {}", parts.join(", "))
    }
}
