// ── User-configured domains ──

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A single domain the user wants routed around the VPN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub domain: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_resolved_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub last_resolved_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl DomainEntry {
    /// Normalize and validate `raw`, producing a new enabled entry.
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let domain = normalize_domain(raw);
        validate_domain(&domain)?;
        Ok(Self {
            id: Uuid::new_v4(),
            domain,
            enabled: true,
            last_resolved_ip: None,
            last_resolved_at: None,
        })
    }

    /// Whether `key` names this entry, by id or by (normalized) domain.
    pub fn matches(&self, key: &str) -> bool {
        self.id.to_string() == key || self.domain == normalize_domain(key)
    }
}

/// Reduce user input to a bare lowercase host name.
///
/// Accepts URLs and pasted fragments: `HTTPS://User@Web.Telegram.org:443/k/?a#b`
/// becomes `web.telegram.org`. Idempotent.
pub fn normalize_domain(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let mut rest = lowered.as_str();

    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
    }
    if let Some(idx) = rest.find(['/', '?', '#']) {
        rest = &rest[..idx];
    }
    if let Some(idx) = rest.rfind('@') {
        rest = &rest[idx + 1..];
    }
    // trailing dots and port suffixes can stack ("example.com:80." or
    // "example.com::80"), so peel until nothing changes
    loop {
        let trimmed = rest.trim().trim_end_matches('.');
        let stripped = match trimmed.rsplit_once(':') {
            Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
            _ => trimmed,
        };
        if stripped == rest {
            break;
        }
        rest = stripped;
    }
    rest.to_owned()
}

/// Reject names that cannot be a DNS host name.
pub fn validate_domain(domain: &str) -> Result<(), CoreError> {
    if domain.is_empty() {
        return Err(CoreError::validation("domain is empty"));
    }
    if domain.len() > MAX_NAME_LEN {
        return Err(CoreError::validation(format!(
            "domain is longer than {MAX_NAME_LEN} characters"
        )));
    }
    if let Some(bad) = domain
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '*' | '_')))
    {
        return Err(CoreError::validation(format!(
            "invalid character '{bad}' in {domain}"
        )));
    }
    for label in domain.split('.') {
        if label.is_empty() {
            return Err(CoreError::validation(format!("empty label in {domain}")));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(CoreError::validation(format!(
                "label '{label}' is longer than {MAX_LABEL_LEN} characters"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_scheme_path_and_case() {
        assert_eq!(normalize_domain("HTTPS://Web.Telegram.org/k/"), "web.telegram.org");
        assert_eq!(normalize_domain("  example.com/  "), "example.com");
        assert_eq!(normalize_domain("example.com."), "example.com");
    }

    #[test]
    fn strips_credentials_port_query_fragment() {
        assert_eq!(
            normalize_domain("https://user:pw@Example.COM:8443/path?q=1#frag"),
            "example.com"
        );
        assert_eq!(normalize_domain("example.com?x=y"), "example.com");
        assert_eq!(normalize_domain("example.com#top"), "example.com");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "HTTPS://Web.Telegram.org/k/",
            "user@host.example:80",
            "a://b://c",
            "example.com:80.",
            "example.com::80",
            "example.com.:443",
            "https:// example.com :80",
            "plain.example",
            "...",
            "",
        ] {
            let once = normalize_domain(raw);
            assert_eq!(normalize_domain(&once), once, "input: {raw:?}");
        }
        assert_eq!(normalize_domain("example.com:80."), "example.com");
        assert_eq!(normalize_domain("example.com::80"), "example.com");
    }

    #[test]
    fn validation_rejects_garbage() {
        assert!(validate_domain("").is_err());
        assert!(validate_domain("exa mple.com").is_err());
        assert!(validate_domain("a..b").is_err());
        assert!(validate_domain(&format!("{}.com", "a".repeat(64))).is_err());
        assert!(validate_domain(&"a.".repeat(127)).is_err());
    }

    #[test]
    fn validation_accepts_real_names() {
        assert!(validate_domain("web.telegram.org").is_ok());
        assert!(validate_domain("_dmarc.example.com").is_ok());
        assert!(validate_domain("xn--e1afmkfd.xn--p1ai").is_ok());
    }

    #[test]
    fn entry_matches_by_id_or_name() {
        let entry = DomainEntry::new("https://Example.com/").unwrap();
        assert!(entry.matches("EXAMPLE.com"));
        assert!(entry.matches(&entry.id.to_string()));
        assert!(!entry.matches("example.org"));
    }

    #[test]
    fn decode_fills_missing_fields() {
        let entry: DomainEntry = serde_json::from_str(r#"{"domain":"example.com"}"#).unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.last_resolved_ip, None);
    }
}
