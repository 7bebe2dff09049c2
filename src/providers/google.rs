use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

use super::http::send_for_text;
use super::{Provider, ProviderFuture, ProviderResponse, TranslationRequest};

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com/translate_a/single";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Google Translate web endpoint (the `gtx` client). Needs no API key.
#[derive(Debug, Clone)]
pub struct Google {
    client: reqwest::Client,
    base_url: String,
}

impl Google {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url(),
        }
    }
}

impl Provider for Google {
    fn translate(self, request: TranslationRequest) -> ProviderFuture {
        Box::pin(async move {
            debug!(
                "google: translating {:?} ({} -> {})",
                request.text, request.source_lang, request.target_lang
            );
            let builder = self
                .client
                .get(&self.base_url)
                .header("User-Agent", USER_AGENT)
                .query(&[
                    ("client", "gtx"),
                    ("sl", request.source_lang.as_str()),
                    ("tl", request.target_lang.as_str()),
                    ("dt", "t"),
                    ("q", request.text.as_str()),
                ]);
            let body = send_for_text("Google Translate", builder).await?;
            let translation = extract_translation(&body)?;
            Ok(ProviderResponse {
                translation,
                model: Some("google-translate".to_string()),
                usage: None,
            })
        })
    }
}

fn base_url() -> String {
    std::env::var("GOOGLE_TRANSLATE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

/// The response is a nested array; the translation is split into segments at
/// `[0][*][0]`.
fn extract_translation(body: &str) -> Result<String> {
    let payload: Value =
        serde_json::from_str(body).with_context(|| "failed to parse Google Translate response")?;
    let segments = payload
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Google Translate response has no segment array"))?;

    let translation = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect::<String>();
    if translation.trim().is_empty() {
        return Err(anyhow!("Google Translate returned an empty translation"));
    }
    Ok(translation)
}

#[cfg(test)]
mod tests {
    use super::extract_translation;

    #[test]
    fn google_joins_translation_segments() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/google_translate_response.json"
        ));
        assert_eq!(
            extract_translation(payload).unwrap(),
            "연간 수익. 지역별 성장"
        );
    }

    #[test]
    fn google_rejects_unexpected_payloads() {
        assert!(extract_translation("{}").is_err());
        assert!(extract_translation("[[]]").is_err());
        assert!(extract_translation("not json").is_err());
    }
}
