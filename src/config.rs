use crate::models::{parse_mac, Mac};
use std::env;

pub struct AppConfig {
    /// Interface for live capture; ignored when `replay_file` is set.
    pub capture_interface: String,
    /// Pcap file to replay instead of capturing live.
    pub replay_file: Option<String>,
    pub http_bind: String,
    pub worker_threads: Option<usize>,
    /// Extra MACs that must never become stations or connection endpoints.
    pub deny_macs: Vec<Mac>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            capture_interface: env_var("CAPTURE_INTERFACE", "wlan0mon"),
            replay_file: env::var("REPLAY_FILE").ok().filter(|s| !s.is_empty()),
            http_bind: env_var("HTTP_BIND", "0.0.0.0:6363"),
            worker_threads: env::var("WORKER_THREADS")
                .ok()
                .and_then(|s| s.parse().ok()),
            deny_macs: parse_deny_list(&env::var("DENY_MACS").unwrap_or_default()),
        }
    }
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_deny_list(raw: &str) -> Vec<Mac> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let mac = parse_mac(s);
            if mac.is_none() {
                tracing::warn!("ignoring invalid MAC in DENY_MACS: {s}");
            }
            mac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_list_parses_and_skips_junk() {
        let macs = parse_deny_list("aa:bb:cc:dd:ee:ff, nonsense ,11-22-33-44-55-66,");
        assert_eq!(macs.len(), 2);
        assert_eq!(macs[0], parse_mac("aa:bb:cc:dd:ee:ff").unwrap());
    }

    #[test]
    fn empty_deny_list_is_empty() {
        assert!(parse_deny_list("").is_empty());
    }
}
