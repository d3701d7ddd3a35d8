use std::collections::HashMap;
use std::sync::Arc;

use super::finding::{Finding, Findings};

/// Key used when no decoder is registered for a tool.
pub const RAW_OUTPUT_KEY: &str = "raw_output";

/// Stateless extractor for one tool's output. Decoding never fails;
/// unmatched text yields empty lists.
pub trait OutputDecoder: Send + Sync {
    fn tool_id(&self) -> &str;
    fn decode(&self, text: &str) -> Findings;
}

#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn OutputDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `decoder` under its tool id, replacing any previous one.
    pub fn register(&mut self, decoder: Arc<dyn OutputDecoder>) -> &mut Self {
        let id = decoder.tool_id().to_ascii_lowercase();
        if self.decoders.insert(id.clone(), decoder).is_some() {
            tracing::debug!(tool = %id, "decoder replaced");
        }
        self
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.decoders.contains_key(&tool_id.to_ascii_lowercase())
    }

    pub fn tool_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    pub fn decode(&self, tool_id: &str, text: &str) -> Findings {
        match self.decoders.get(&tool_id.to_ascii_lowercase()) {
            Some(decoder) => decoder.decode(text),
            None => {
                tracing::debug!(tool = %tool_id, "no decoder registered, keeping raw output");
                let mut findings = Findings::new();
                findings.push(
                    RAW_OUTPUT_KEY,
                    Finding::Raw {
                        text: text.to_string(),
                    },
                );
                findings
            }
        }
    }
}
