use lazy_static::lazy_static;
use regex::Regex;

use tajaa_core::decoder::{Finding, Findings, OutputDecoder};

lazy_static! {
    static ref SERVER: Regex = Regex::new(r"(?m)Server: (.+)$").unwrap();
    static ref VULN: Regex = Regex::new(r"(?m)\+ (OSVDB-\d+|[A-Z]{3,}:.*?): (.+)$").unwrap();
}

pub struct NiktoDecoder;

impl OutputDecoder for NiktoDecoder {
    fn tool_id(&self) -> &str {
        "nikto"
    }

    fn decode(&self, text: &str) -> Findings {
        let mut out = Findings::new();
        out.ensure("server");
        out.ensure("vulnerabilities");

        // Only the first banner counts.
        if let Some(caps) = SERVER.captures(text) {
            out.push(
                "server",
                Finding::Server {
                    banner: caps[1].trim().to_string(),
                },
            );
        }

        for caps in VULN.captures_iter(text) {
            out.push(
                "vulnerabilities",
                Finding::Vulnerability {
                    id: caps[1].to_string(),
                    description: caps[2].trim().to_string(),
                },
            );
        }

        out
    }
}
