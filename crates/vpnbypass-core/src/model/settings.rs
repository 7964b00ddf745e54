// ── User settings ──
//
// The engine's owned copy of everything the user configured. Domains and
// services live in ordered maps keyed by stable id so that planning walks
// them in configuration order.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::domain::{DomainEntry, normalize_domain, validate_domain};
use super::service::ServiceEntry;
use crate::error::CoreError;

/// Behaviour flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Apply routes automatically when a VPN connection appears.
    pub auto_apply: bool,
    /// Mirror resolved domains into the hosts file.
    pub manage_hosts: bool,
    /// Run a verification pass after every full apply.
    pub verify_after_apply: bool,
    pub auto_refresh: bool,
    pub refresh_interval_secs: u64,
    /// Ordered fallback upstreams: `1.1.1.1`, `https://…/dns-query`,
    /// `tls://dns.example` or `host:853`.
    pub fallback_dns: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_apply: true,
            manage_hosts: false,
            verify_after_apply: false,
            auto_refresh: true,
            refresh_interval_secs: 3600,
            fallback_dns: vec![
                "1.1.1.1".into(),
                "8.8.8.8".into(),
                "https://cloudflare-dns.com/dns-query".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub domains: IndexMap<Uuid, DomainEntry>,
    pub services: IndexMap<String, ServiceEntry>,
    pub preferences: Preferences,
}

impl Settings {
    /// Build from persisted lists. Invalid or duplicate domains are
    /// dropped with a warning rather than failing the load.
    pub fn new(
        domains: Vec<DomainEntry>,
        services: Vec<ServiceEntry>,
        preferences: Preferences,
    ) -> Self {
        let mut settings = Self {
            domains: IndexMap::new(),
            services: IndexMap::new(),
            preferences,
        };

        for mut entry in domains {
            entry.domain = normalize_domain(&entry.domain);
            if let Err(e) = validate_domain(&entry.domain) {
                warn!(domain = %entry.domain, error = %e, "dropping invalid domain from config");
                continue;
            }
            if settings.contains_domain(&entry.domain) {
                warn!(domain = %entry.domain, "dropping duplicate domain from config");
                continue;
            }
            settings.domains.insert(entry.id, entry);
        }

        for service in services {
            if settings.services.contains_key(&service.id) {
                warn!(service = %service.id, "dropping duplicate service from config");
                continue;
            }
            settings.services.insert(service.id.clone(), service);
        }

        settings
    }

    pub fn contains_domain(&self, normalized: &str) -> bool {
        self.domains.values().any(|d| d.domain == normalized)
    }

    pub fn find_domain(&self, key: &str) -> Option<&DomainEntry> {
        self.domains.values().find(|d| d.matches(key))
    }

    pub fn find_service(&self, key: &str) -> Option<&ServiceEntry> {
        self.services
            .get(key)
            .or_else(|| self.services.values().find(|s| s.matches(key)))
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Add a domain. The same normalized name is rejected the second time.
    pub fn add_domain(&mut self, raw: &str) -> Result<DomainEntry, CoreError> {
        let entry = DomainEntry::new(raw)?;
        if self.contains_domain(&entry.domain) {
            return Err(CoreError::DuplicateDomain {
                domain: entry.domain,
            });
        }
        self.domains.insert(entry.id, entry.clone());
        Ok(entry)
    }

    pub fn remove_domain(&mut self, key: &str) -> Result<DomainEntry, CoreError> {
        let id = self
            .find_domain(key)
            .map(|d| d.id)
            .ok_or_else(|| CoreError::DomainNotFound {
                identifier: key.to_owned(),
            })?;
        self.domains
            .shift_remove(&id)
            .ok_or_else(|| CoreError::Internal(format!("domain {id} vanished")))
    }

    pub fn set_domain_enabled(&mut self, key: &str, enabled: bool) -> Result<DomainEntry, CoreError> {
        let entry = self
            .domains
            .values_mut()
            .find(|d| d.matches(key))
            .ok_or_else(|| CoreError::DomainNotFound {
                identifier: key.to_owned(),
            })?;
        entry.enabled = enabled;
        Ok(entry.clone())
    }

    pub fn set_service_enabled(
        &mut self,
        key: &str,
        enabled: bool,
    ) -> Result<ServiceEntry, CoreError> {
        let id = self
            .find_service(key)
            .map(|s| s.id.clone())
            .ok_or_else(|| CoreError::ServiceNotFound {
                identifier: key.to_owned(),
            })?;
        let service = self
            .services
            .get_mut(&id)
            .ok_or_else(|| CoreError::Internal(format!("service {id} vanished")))?;
        service.enabled = enabled;
        Ok(service.clone())
    }

    /// Stamp the latest resolution onto a configured domain, if any.
    pub fn record_resolution(&mut self, domain: &str, ip: Ipv4Addr, at: DateTime<Utc>) {
        if let Some(entry) = self.domains.values_mut().find(|d| d.domain == domain) {
            entry.last_resolved_ip = Some(ip);
            entry.last_resolved_at = Some(at);
        }
    }

    /// Add catalog services this settings document doesn't know yet.
    /// Known ids keep their enable state; domains and ranges follow the
    /// catalog.
    pub fn merge_catalog(&mut self, catalog: Vec<ServiceEntry>) {
        for service in catalog {
            match self.services.get_mut(&service.id) {
                Some(existing) => {
                    existing.name = service.name;
                    existing.domains = service.domains;
                    existing.ip_ranges = service.ip_ranges;
                }
                None => {
                    self.services.insert(service.id.clone(), service);
                }
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn enabled_domains(&self) -> impl Iterator<Item = &DomainEntry> {
        self.domains.values().filter(|d| d.enabled)
    }

    pub fn enabled_services(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.services.values().filter(|s| s.enabled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> Settings {
        Settings::new(
            Vec::new(),
            vec![ServiceEntry::new("telegram", "Telegram", &["telegram.org"], &[])],
            Preferences::default(),
        )
    }

    #[test]
    fn duplicate_domain_rejected_case_insensitively() {
        let mut s = settings();
        s.add_domain("Example.com").unwrap();
        let err = s.add_domain("https://EXAMPLE.COM/path").unwrap_err();
        assert!(matches!(err, CoreError::DuplicateDomain { ref domain } if domain == "example.com"));
        assert_eq!(s.domains.len(), 1);
    }

    #[test]
    fn remove_and_toggle_by_name() {
        let mut s = settings();
        s.add_domain("a.example").unwrap();
        s.add_domain("b.example").unwrap();

        let toggled = s.set_domain_enabled("A.EXAMPLE", false).unwrap();
        assert!(!toggled.enabled);
        assert_eq!(s.enabled_domains().count(), 1);

        s.remove_domain("b.example").unwrap();
        assert!(matches!(
            s.remove_domain("b.example"),
            Err(CoreError::DomainNotFound { .. })
        ));
    }

    #[test]
    fn service_toggle_by_id_or_name() {
        let mut s = settings();
        assert!(s.set_service_enabled("Telegram", true).unwrap().enabled);
        assert_eq!(s.enabled_services().count(), 1);
        assert!(matches!(
            s.set_service_enabled("nope", true),
            Err(CoreError::ServiceNotFound { .. })
        ));
    }

    #[test]
    fn load_drops_invalid_and_duplicate_domains() {
        let a: DomainEntry = serde_json::from_str(r#"{"domain":"Example.com/"}"#).unwrap();
        let b: DomainEntry = serde_json::from_str(r#"{"domain":"example.com"}"#).unwrap();
        let c: DomainEntry = serde_json::from_str(r#"{"domain":"bad domain"}"#).unwrap();
        let s = Settings::new(vec![a, b, c], Vec::new(), Preferences::default());
        let names: Vec<&str> = s.domains.values().map(|d| d.domain.as_str()).collect();
        assert_eq!(names, vec!["example.com"]);
    }

    #[test]
    fn merge_catalog_keeps_enable_state() {
        let mut s = settings();
        s.set_service_enabled("telegram", true).unwrap();
        s.merge_catalog(vec![
            ServiceEntry::new("telegram", "Telegram", &["t.me"], &[]),
            ServiceEntry::new("signal", "Signal", &["signal.org"], &[]),
        ]);
        assert!(s.services["telegram"].enabled);
        assert_eq!(s.services["telegram"].domains, vec!["t.me"]);
        assert!(!s.services["signal"].enabled);
    }

    #[test]
    fn preferences_decode_with_defaults() {
        let p: Preferences = serde_json::from_str(r#"{"manage_hosts":true}"#).unwrap();
        assert!(p.manage_hosts);
        assert!(p.auto_apply);
        assert_eq!(p.refresh_interval_secs, 3600);
    }
}
