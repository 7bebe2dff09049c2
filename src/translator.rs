use std::time::Duration;
use tracing::{debug, error, warn};

use crate::annotations::FieldValue;
use crate::classify::{is_numeric, parse_numeric};
use crate::providers::{Provider, ProviderResponse, TranslationRequest};
use crate::translations::TranslateOptions;

pub const DEFAULT_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Outcome of the pass-through rules applied before any provider call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Prepared<'a> {
    Ready(FieldValue),
    Translate(&'a str),
}

#[derive(Debug, Clone)]
pub struct Translator<P: Provider> {
    provider: P,
    options: TranslateOptions,
    retry: RetryPolicy,
}

impl<P: Provider> Translator<P> {
    pub fn new(provider: P, options: TranslateOptions) -> Self {
        Self {
            provider,
            options,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            attempts: retry.attempts.max(1),
            delay: retry.delay,
        };
        self
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    /// Translates one annotation value.
    ///
    /// Absent input becomes `" "`, blank input is returned as is, numeric
    /// input becomes a number. Anything else goes to the provider; when every
    /// attempt fails the original text comes back unchanged.
    pub async fn translate(&self, text: Option<&str>) -> FieldValue {
        match prepare(text) {
            Prepared::Ready(value) => value,
            Prepared::Translate(text) => match self.request(text).await {
                Some(response) => FieldValue::Text(response.translation),
                None => FieldValue::Text(text.to_string()),
            },
        }
    }

    /// Calls the provider with the retry policy. `None` means every attempt
    /// failed; the failures have already been logged.
    pub(crate) async fn request(&self, text: &str) -> Option<ProviderResponse> {
        let attempts = self.retry.attempts;
        for attempt in 1..=attempts {
            let request = TranslationRequest::new(text, &self.options);
            match self.provider.clone().translate(request).await {
                Ok(response) => {
                    debug!("translated {:?} -> {:?}", text, response.translation);
                    return Some(response);
                }
                Err(err) => {
                    warn!(
                        "translation of {:?} failed (attempt {}/{}): {:#}",
                        text, attempt, attempts, err
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }
        error!(
            "translation of {:?} failed after {} attempts; keeping the original text",
            text, attempts
        );
        None
    }
}

pub(crate) fn prepare(text: Option<&str>) -> Prepared<'_> {
    let Some(text) = text else {
        return Prepared::Ready(FieldValue::Text(" ".to_string()));
    };
    if text.trim().is_empty() {
        return Prepared::Ready(FieldValue::Text(text.to_string()));
    }
    if is_numeric(text) {
        return Prepared::Ready(
            parse_numeric(text)
                .and_then(FieldValue::from_f64)
                .unwrap_or_else(|| FieldValue::Text(text.to_string())),
        );
    }
    Prepared::Translate(text)
}
