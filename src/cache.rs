use std::collections::HashMap;

use crate::annotations::FieldValue;
use crate::providers::{Provider, ProviderUsage};
use crate::translator::{Prepared, Translator, prepare};

/// Memoises translations inside one annotation record, so a tick value that
/// is both rewritten in `values` and redrawn at its box costs one call.
#[derive(Debug)]
pub struct TranslationCache {
    map: HashMap<String, String>,
    model: Option<String>,
    usage: ProviderUsage,
    used: bool,
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationCache {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            model: None,
            usage: ProviderUsage {
                prompt_tokens: Some(0),
                completion_tokens: Some(0),
                total_tokens: Some(0),
            },
            used: false,
        }
    }

    pub async fn translate<P: Provider>(
        &mut self,
        text: Option<&str>,
        translator: &Translator<P>,
    ) -> FieldValue {
        let text = match prepare(text) {
            Prepared::Ready(value) => return value,
            Prepared::Translate(text) => text,
        };
        if let Some(existing) = self.map.get(text) {
            return FieldValue::Text(existing.clone());
        }
        let Some(response) = translator.request(text).await else {
            return FieldValue::Text(text.to_string());
        };
        if self.model.is_none() {
            self.model = response.model.clone();
        }
        if let Some(usage) = response.usage {
            self.usage = merge_usage(self.usage.clone(), Some(usage));
            self.used = true;
        }
        self.map.insert(text.to_string(), response.translation.clone());
        FieldValue::Text(response.translation)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn usage(&self) -> Option<&ProviderUsage> {
        self.used.then_some(&self.usage)
    }
}

pub fn merge_usage(total: ProviderUsage, next: Option<ProviderUsage>) -> ProviderUsage {
    let Some(next) = next else {
        return total;
    };
    ProviderUsage {
        prompt_tokens: Some(total.prompt_tokens.unwrap_or(0) + next.prompt_tokens.unwrap_or(0)),
        completion_tokens: Some(
            total.completion_tokens.unwrap_or(0) + next.completion_tokens.unwrap_or(0),
        ),
        total_tokens: Some(total.total_tokens.unwrap_or(0) + next.total_tokens.unwrap_or(0)),
    }
}
