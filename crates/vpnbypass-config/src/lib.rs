//! Persisted configuration for vpnbypass.
//!
//! One JSON document holds the user's domains, service toggles and
//! preferences plus optional engine tuning. This crate loads it through
//! figment (defaults, then the file, then `VPNBYPASS_` environment
//! overrides), saves it back atomically, and translates it into the
//! `vpnbypass_core::EngineConfig` the engine runs with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use vpnbypass_core::catalog::builtin_services;
use vpnbypass_core::scheduler::MIN_REFRESH_INTERVAL;
use vpnbypass_core::{
    DomainEntry, EngineConfig, Preferences, ServiceEntry, Settings, ToolPaths, Upstream,
};

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "VPNBYPASS_CONFIG";
/// Overrides the state directory.
pub const STATE_DIR_ENV: &str = "VPNBYPASS_STATE_DIR";

const DNS_CACHE_FILE: &str = "dns-cache.json";
const ROUTES_FILE: &str = "routes.json";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown setting '{key}'")]
    UnknownKey { key: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config document ─────────────────────────────────────────────────

/// Top-level persisted document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub domains: Vec<DomainEntry>,
    pub services: Vec<ServiceEntry>,
    pub preferences: Preferences,
    pub engine: EngineSection,
}

/// Engine tuning. Rarely edited; every field has a working default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSection {
    pub status_poll_secs: u64,
    pub reconnect_cooldown_secs: u64,
    pub probe_timeout_secs: u64,
    pub resolve_concurrency: usize,
    pub verify_concurrency: usize,
    pub batch_size: usize,
    pub helper_socket: PathBuf,
    pub helper_timeout_secs: u64,
    pub helper_batch_timeout_secs: u64,
    pub hosts_path: PathBuf,
    /// Prefix for privileged commands when the helper is unavailable.
    pub elevation: Vec<String>,
    pub dig: String,
    pub kdig: String,
    pub tailscale: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            status_poll_secs: engine.status_poll_interval.as_secs(),
            reconnect_cooldown_secs: engine.reconnect_cooldown.as_secs(),
            probe_timeout_secs: engine.probe_timeout.as_secs(),
            resolve_concurrency: engine.resolve_concurrency,
            verify_concurrency: engine.verify_concurrency,
            batch_size: engine.batch_size,
            helper_socket: engine.helper_socket,
            helper_timeout_secs: engine.helper_timeout.as_secs(),
            helper_batch_timeout_secs: engine.helper_batch_timeout.as_secs(),
            hosts_path: engine.hosts_path,
            elevation: engine.elevation,
            dig: engine.tools.dig,
            kdig: engine.tools.kdig,
            tailscale: engine.tools.tailscale,
        }
    }
}

impl Config {
    /// Engine settings: configured domains and services, with catalog
    /// services this document doesn't know yet merged in.
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::new(
            self.domains.clone(),
            self.services.clone(),
            self.preferences.clone(),
        );
        settings.merge_catalog(builtin_services());
        settings
    }

    /// Copy the engine's current settings back into the document.
    pub fn update_from_settings(&mut self, settings: &Settings) {
        self.domains = settings.domains.values().cloned().collect();
        self.services = settings.services.values().cloned().collect();
        self.preferences = settings.preferences.clone();
    }

    /// Runtime engine configuration. The DNS cache and route ledger live
    /// in `state_dir`.
    pub fn to_engine_config(&self, state_dir: &Path) -> EngineConfig {
        let e = &self.engine;
        EngineConfig {
            probe_timeout: Duration::from_secs(e.probe_timeout_secs.max(1)),
            tools: ToolPaths {
                dig: e.dig.clone(),
                kdig: e.kdig.clone(),
                tailscale: e.tailscale.clone(),
            },
            resolve_concurrency: e.resolve_concurrency.max(1),
            verify_concurrency: e.verify_concurrency.max(1),
            batch_size: e.batch_size.max(1),
            reconnect_cooldown: Duration::from_secs(e.reconnect_cooldown_secs),
            status_poll_interval: Duration::from_secs(e.status_poll_secs),
            helper_socket: e.helper_socket.clone(),
            helper_timeout: Duration::from_secs(e.helper_timeout_secs.max(1)),
            helper_batch_timeout: Duration::from_secs(e.helper_batch_timeout_secs.max(1)),
            hosts_path: e.hosts_path.clone(),
            dns_cache_path: Some(state_dir.join(DNS_CACHE_FILE)),
            routes_path: Some(state_dir.join(ROUTES_FILE)),
            elevation: e.elevation.clone(),
            ..EngineConfig::default()
        }
    }

    /// Set one user-facing preference from its string form.
    ///
    /// Keys: `auto_apply`, `manage_hosts`, `verify_after_apply`,
    /// `auto_refresh`, `refresh_interval` (seconds or a humantime
    /// duration like `30m`), `fallback_dns` (comma-separated).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let prefs = &mut self.preferences;
        match key.replace('-', "_").as_str() {
            "auto_apply" => prefs.auto_apply = parse_bool(key, value)?,
            "manage_hosts" => prefs.manage_hosts = parse_bool(key, value)?,
            "verify_after_apply" => prefs.verify_after_apply = parse_bool(key, value)?,
            "auto_refresh" => prefs.auto_refresh = parse_bool(key, value)?,
            "refresh_interval" | "refresh_interval_secs" => {
                prefs.refresh_interval_secs = parse_interval(key, value)?;
            }
            "fallback_dns" => prefs.fallback_dns = parse_upstreams(key, value)?,
            _ => {
                return Err(ConfigError::UnknownKey {
                    key: key.to_owned(),
                });
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(invalid(field, format!("expected true or false, got '{other}'"))),
    }
}

fn parse_interval(field: &str, value: &str) -> Result<u64, ConfigError> {
    let value = value.trim();
    let secs = match value.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(value)
            .map_err(|e| invalid(field, e.to_string()))?
            .as_secs(),
    };
    if secs < MIN_REFRESH_INTERVAL.as_secs() {
        return Err(invalid(
            field,
            format!("must be at least {}s", MIN_REFRESH_INTERVAL.as_secs()),
        ));
    }
    Ok(secs)
}

fn parse_upstreams(field: &str, value: &str) -> Result<Vec<String>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| {
            raw.parse::<Upstream>()
                .map(|_| raw.to_owned())
                .map_err(|e| invalid(field, format!("'{raw}': {e}")))
        })
        .collect()
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "vpnbypass", "vpnbypass")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// The config file: `$VPNBYPASS_CONFIG`, else the platform config dir.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(&[".config", "vpnbypass", "config.json"]),
        |dirs| dirs.config_dir().join("config.json"),
    )
}

/// Directory for the DNS cache, route ledger and daemon log.
pub fn state_dir() -> PathBuf {
    if let Some(path) = std::env::var_os(STATE_DIR_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(&[".local", "state", "vpnbypass"]),
        |dirs| dirs.data_local_dir().to_path_buf(),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load from `path`, then apply `VPNBYPASS_` overrides
/// (`VPNBYPASS_PREFERENCES__AUTO_APPLY=false`). A missing file yields
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Json::file(path))
        .merge(
            Env::prefixed("VPNBYPASS_")
                .ignore(&["CONFIG", "STATE_DIR"])
                .split("__"),
        );

    let config: Config = figment.extract()?;
    debug!(
        path = %path.display(),
        domains = config.domains.len(),
        services = config.services.len(),
        "loaded config"
    );
    Ok(config)
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config; an unreadable document is logged and replaced by
/// defaults.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        warn!(error = %e, "config unreadable, using defaults");
        Config::default()
    })
}

// ── Saving ──────────────────────────────────────────────────────────

/// Write `cfg` to `path` via a sibling temp file and rename.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(cfg)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn settings_gain_catalog_services() {
        let mut cfg = Config::default();
        let mut telegram = ServiceEntry::new("telegram", "Telegram", &["old.example"], &[]);
        telegram.enabled = true;
        cfg.services.push(telegram);

        let settings = cfg.to_settings();
        let telegram = &settings.services["telegram"];
        assert!(telegram.enabled);
        assert!(telegram.domains.contains(&"telegram.org".to_owned()));
        assert_eq!(settings.services.len(), builtin_services().len());
    }

    #[test]
    fn set_parses_preferences() {
        let mut cfg = Config::default();
        cfg.set("auto-apply", "off").unwrap();
        cfg.set("refresh_interval", "30m").unwrap();
        cfg.set("fallback_dns", "9.9.9.9, https://dns.quad9.net/dns-query").unwrap();

        assert!(!cfg.preferences.auto_apply);
        assert_eq!(cfg.preferences.refresh_interval_secs, 1800);
        assert_eq!(
            cfg.preferences.fallback_dns,
            vec!["9.9.9.9", "https://dns.quad9.net/dns-query"]
        );
    }

    #[test]
    fn set_rejects_bad_values() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("refresh_interval", "10"),
            Err(ConfigError::Validation { .. })
        ));
        assert!(matches!(
            cfg.set("manage_hosts", "maybe"),
            Err(ConfigError::Validation { .. })
        ));
        assert!(matches!(
            cfg.set("colour", "on"),
            Err(ConfigError::UnknownKey { .. })
        ));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn engine_config_points_cache_into_state_dir() {
        let mut cfg = Config::default();
        cfg.engine.batch_size = 0;
        cfg.engine.status_poll_secs = 30;

        let engine = cfg.to_engine_config(Path::new("/var/lib/vpnbypass"));
        assert_eq!(
            engine.dns_cache_path.as_deref(),
            Some(Path::new("/var/lib/vpnbypass/dns-cache.json"))
        );
        assert_eq!(engine.batch_size, 1);
        assert_eq!(engine.status_poll_interval, Duration::from_secs(30));
        assert!(engine.scheduler_enabled);
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.json",
                r#"{"preferences": {"auto_apply": true, "refresh_interval_secs": 600}}"#,
            )?;
            jail.set_env("VPNBYPASS_PREFERENCES__AUTO_APPLY", "false");
            jail.set_env("VPNBYPASS_CONFIG", "ignored.json");

            let cfg = load_config_from(Path::new("config.json")).map_err(|e| e.to_string())?;
            assert!(!cfg.preferences.auto_apply);
            assert_eq!(cfg.preferences.refresh_interval_secs, 600);
            assert!(cfg.preferences.auto_refresh);
            Ok(())
        });
    }
}
