use lazy_static::lazy_static;
use regex::Regex;

use tajaa_core::decoder::{Finding, Findings, OutputDecoder};

lazy_static! {
    static ref DISCOVERED: Regex =
        Regex::new(r"Discovered open port (\d+)/(tcp|udp) on (\S+)").unwrap();
}

pub struct MasscanDecoder;

impl OutputDecoder for MasscanDecoder {
    fn tool_id(&self) -> &str {
        "masscan"
    }

    fn decode(&self, text: &str) -> Findings {
        let mut out = Findings::new();
        out.ensure("ports");
        out.ensure("hosts");

        let mut seen_hosts: Vec<String> = Vec::new();
        for caps in DISCOVERED.captures_iter(text) {
            let Ok(port) = caps[1].parse::<u16>() else {
                continue;
            };
            out.push(
                "ports",
                Finding::Port {
                    port,
                    protocol: caps[2].to_string(),
                    service: None,
                    version: None,
                },
            );

            let host = &caps[3];
            if !seen_hosts.iter().any(|h| h == host) {
                seen_hosts.push(host.to_string());
                out.push(
                    "hosts",
                    Finding::Host {
                        address: host.to_string(),
                    },
                );
            }
        }

        out
    }
}
