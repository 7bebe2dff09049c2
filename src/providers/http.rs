use anyhow::{Result, anyhow};
use reqwest::RequestBuilder;
use serde::Deserialize;

/// Sends a request and returns the body of a successful response. Error
/// bodies are condensed into `"<provider> API error (<status>): <message>"`.
pub(crate) async fn send_for_text(provider: &str, request: RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|err| anyhow!("{} request failed: {}", provider, err))?;
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    if status.is_success() {
        return Ok(text);
    }
    Err(anyhow!(
        "{} API error ({}): {}",
        provider,
        status,
        extract_error(&text).unwrap_or(text)
    ))
}

/// Understands the `{"error": {...}}` envelopes of the supported chat APIs.
fn extract_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        status: Option<String>,
        code: Option<serde_json::Value>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let code = error.code.map(|code| match code {
        serde_json::Value::String(value) => value,
        other => other.to_string(),
    });
    Some(format_error_parts(
        error.message,
        error.kind.or(error.status),
        code,
    ))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(kind) = kind.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::extract_error;

    #[test]
    fn error_envelopes_are_condensed() {
        let openai = r#"{"error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}}"#;
        assert_eq!(
            extract_error(openai).unwrap(),
            "Rate limit reached | type: requests | code: rate_limit_exceeded"
        );

        let gemini = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            extract_error(gemini).unwrap(),
            "Quota exceeded | type: RESOURCE_EXHAUSTED | code: 429"
        );

        assert_eq!(extract_error(r#"{"error": {}}"#).unwrap(), "unknown error");
        assert!(extract_error("<html>bad gateway</html>").is_none());
    }
}
