use lazy_static::lazy_static;
use regex::Regex;

use tajaa_core::decoder::{Finding, Findings, OutputDecoder};

lazy_static! {
    static ref PORT_LINE: Regex =
        Regex::new(r"(?m)(\d+)/(tcp|udp)[ \t]+open[ \t]+(\S+)(?:[ \t]+(.*))?$").unwrap();
    static ref HOST_LINE: Regex = Regex::new(r"Nmap scan report for (\S+)").unwrap();
    static ref OS_LINE: Regex = Regex::new(r"(?m)OS details: (.+)$").unwrap();
}

/// `ports` holds bare port/protocol pairs, `services` the same entries with
/// service name and version banner.
pub struct NmapDecoder;

impl OutputDecoder for NmapDecoder {
    fn tool_id(&self) -> &str {
        "nmap"
    }

    fn decode(&self, text: &str) -> Findings {
        let mut out = Findings::new();
        for key in ["hosts", "ports", "services", "os_detection"] {
            out.ensure(key);
        }

        for caps in PORT_LINE.captures_iter(text) {
            let Ok(port) = caps[1].parse::<u16>() else {
                continue;
            };
            let protocol = caps[2].to_string();
            let version = caps
                .get(4)
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty());

            out.push(
                "ports",
                Finding::Port {
                    port,
                    protocol: protocol.clone(),
                    service: None,
                    version: None,
                },
            );
            out.push(
                "services",
                Finding::Port {
                    port,
                    protocol,
                    service: Some(caps[3].to_string()),
                    version,
                },
            );
        }

        for caps in HOST_LINE.captures_iter(text) {
            out.push(
                "hosts",
                Finding::Host {
                    address: caps[1].to_string(),
                },
            );
        }

        for caps in OS_LINE.captures_iter(text) {
            out.push(
                "os_detection",
                Finding::OsGuess {
                    details: caps[1].trim().to_string(),
                },
            );
        }

        out
    }
}
