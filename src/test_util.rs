use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::annotations::BoundingBox;
use crate::overlay::Canvas;
use crate::providers::{
    Provider, ProviderFuture, ProviderResponse, ProviderUsage, TranslationRequest,
};
use crate::translator::RetryPolicy;

pub(crate) fn instant_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        delay: Duration::ZERO,
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    calls: usize,
    requests: Vec<TranslationRequest>,
}

/// Deterministic provider: answers `<prefix><text>` after failing the first
/// `failures` calls.
#[derive(Debug, Clone)]
pub(crate) struct ScriptedProvider {
    prefix: String,
    failures: usize,
    usage: Option<ProviderUsage>,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProvider {
    pub(crate) fn prefixing(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            failures: 0,
            usage: None,
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    pub(crate) fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn with_usage(mut self, prompt: u64, completion: u64) -> Self {
        self.usage = Some(ProviderUsage {
            prompt_tokens: Some(prompt),
            completion_tokens: Some(completion),
            total_tokens: Some(prompt + completion),
        });
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.lock().expect("script state").calls
    }

    pub(crate) fn requests(&self) -> Vec<TranslationRequest> {
        self.state.lock().expect("script state").requests.clone()
    }
}

impl Provider for ScriptedProvider {
    fn translate(self, request: TranslationRequest) -> ProviderFuture {
        Box::pin(async move {
            let call = {
                let mut state = self.state.lock().expect("script state");
                state.calls += 1;
                state.requests.push(request.clone());
                state.calls
            };
            if call <= self.failures {
                return Err(anyhow!("scripted failure #{}", call));
            }
            Ok(ProviderResponse {
                translation: format!("{}{}", self.prefix, request.text),
                model: Some("scripted".to_string()),
                usage: self.usage.clone(),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DrawOp {
    Fill {
        rect: BoundingBox,
        color: String,
    },
    Text {
        x: f64,
        y: f64,
        size: u32,
        text: String,
    },
    RotatedText {
        x: f64,
        y: f64,
        buffer: u32,
        size: u32,
        text: String,
    },
}

#[derive(Debug, Default)]
pub(crate) struct RecordingCanvas {
    pub(crate) ops: Vec<DrawOp>,
}

impl RecordingCanvas {
    pub(crate) fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } | DrawOp::RotatedText { text, .. } => {
                    Some(text.as_str())
                }
                DrawOp::Fill { .. } => None,
            })
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn fill_rect(&mut self, rect: &BoundingBox, color: &str) -> Result<()> {
        self.ops.push(DrawOp::Fill {
            rect: rect.clone(),
            color: color.to_string(),
        });
        Ok(())
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str, size: u32, _color: &str) -> Result<()> {
        self.ops.push(DrawOp::Text {
            x,
            y,
            size,
            text: text.to_string(),
        });
        Ok(())
    }

    fn draw_rotated_text(
        &mut self,
        x: f64,
        y: f64,
        buffer: u32,
        text: &str,
        size: u32,
        _color: &str,
    ) -> Result<()> {
        self.ops.push(DrawOp::RotatedText {
            x,
            y,
            buffer,
            size,
            text: text.to_string(),
        });
        Ok(())
    }
}
