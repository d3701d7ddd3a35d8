use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One structured fact pulled out of a tool's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Host {
        address: String,
    },
    Port {
        port: u16,
        protocol: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Vulnerability {
        id: String,
        description: String,
    },
    Path {
        path: String,
        status: u16,
    },
    StatusCount {
        status: u16,
        count: usize,
    },
    Technology {
        name: String,
    },
    OsGuess {
        details: String,
    },
    Server {
        banner: String,
    },
    Raw {
        text: String,
    },
}

/// Findings grouped under string keys (`ports`, `hosts`, ...), ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Findings(BTreeMap<String, Vec<Finding>>);

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `key` is present, even if nothing ends up under it.
    pub fn ensure(&mut self, key: &str) -> &mut Vec<Finding> {
        self.0.entry(key.to_string()).or_default()
    }

    pub fn push(&mut self, key: &str, finding: Finding) {
        self.ensure(key).push(finding);
    }

    pub fn get(&self, key: &str) -> &[Finding] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// True when no key holds any finding.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Finding])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}
