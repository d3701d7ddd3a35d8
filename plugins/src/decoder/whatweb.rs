use tajaa_core::decoder::{Finding, Findings, OutputDecoder};

const KNOWN: &[(&str, &str)] = &[
    ("WordPress", "wordpress"),
    ("Drupal", "drupal"),
    ("Joomla", "joomla"),
    ("Apache", "apache"),
    ("Nginx", "nginx"),
    ("PHP", "php"),
    ("jQuery", "jquery"),
    ("Bootstrap", "bootstrap"),
];

pub struct WhatwebDecoder;

impl OutputDecoder for WhatwebDecoder {
    fn tool_id(&self) -> &str {
        "whatweb"
    }

    fn decode(&self, text: &str) -> Findings {
        let mut out = Findings::new();
        out.ensure("technologies");

        let lower = text.to_lowercase();
        for (name, keyword) in KNOWN {
            if lower.contains(keyword) {
                out.push(
                    "technologies",
                    Finding::Technology {
                        name: (*name).to_string(),
                    },
                );
            }
        }

        out
    }
}
