// ── Predefined services ──

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A named bundle of domains and published IP ranges (e.g. Telegram).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Stable key, unique across the catalog.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub domains: Vec<String>,
    /// CIDR strings as published by the service operator.
    #[serde(default)]
    pub ip_ranges: Vec<String>,
}

impl ServiceEntry {
    pub fn new(id: &str, name: &str, domains: &[&str], ip_ranges: &[&str]) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            enabled: false,
            domains: domains.iter().map(|d| (*d).to_owned()).collect(),
            ip_ranges: ip_ranges.iter().map(|r| (*r).to_owned()).collect(),
        }
    }

    /// Whether `key` names this service, by id or display name.
    pub fn matches(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.name.eq_ignore_ascii_case(key)
    }

    /// Parsed IP ranges, normalized to their network address. Malformed
    /// entries are skipped with a warning.
    pub fn networks(&self) -> Vec<Ipv4Net> {
        self.ip_ranges
            .iter()
            .filter_map(|raw| match raw.trim().parse::<Ipv4Net>() {
                Ok(net) => Some(net.trunc()),
                Err(e) => {
                    warn!(service = %self.id, range = %raw, error = %e, "skipping malformed IP range");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_skip_malformed_and_truncate() {
        let svc = ServiceEntry::new(
            "demo",
            "Demo",
            &[],
            &["91.108.4.0/22", "not-a-cidr", "149.154.160.5/20"],
        );
        let nets: Vec<String> = svc.networks().iter().map(ToString::to_string).collect();
        assert_eq!(nets, vec!["91.108.4.0/22", "149.154.160.0/20"]);
    }

    #[test]
    fn matches_id_or_name_case_insensitively() {
        let svc = ServiceEntry::new("telegram", "Telegram", &[], &[]);
        assert!(svc.matches("TELEGRAM"));
        assert!(!svc.matches("signal"));
    }
}
