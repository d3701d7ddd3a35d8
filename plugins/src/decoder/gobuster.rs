use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use tajaa_core::decoder::{Finding, Findings, OutputDecoder};

lazy_static! {
    static ref ENTRY: Regex = Regex::new(r"/(\S+)\s+\(Status: (\d+)\)").unwrap();
}

/// Splits hits into `directories` and `files` (last segment has a dot) and
/// tallies `status_codes`.
pub struct GobusterDecoder;

impl OutputDecoder for GobusterDecoder {
    fn tool_id(&self) -> &str {
        "gobuster"
    }

    fn decode(&self, text: &str) -> Findings {
        let mut out = Findings::new();
        out.ensure("directories");
        out.ensure("files");
        out.ensure("status_codes");

        let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
        for caps in ENTRY.captures_iter(text) {
            let Ok(status) = caps[2].parse::<u16>() else {
                continue;
            };
            let path = format!("/{}", &caps[1]);
            let is_file = path.rsplit('/').next().is_some_and(|seg| seg.contains('.'));
            let key = if is_file { "files" } else { "directories" };

            out.push(key, Finding::Path { path, status });
            *counts.entry(status).or_default() += 1;
        }

        for (status, count) in counts {
            out.push("status_codes", Finding::StatusCount { status, count });
        }

        out
    }
}
