//! CLI configuration: thin wrapper around `vpnbypass_config`.
//!
//! Re-exports the shared types and adds the helpers every command handler
//! needs: the engine config for this machine, and writing engine settings
//! back to disk.

use std::path::PathBuf;

use vpnbypass_core::{EngineConfig, Settings};

use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use vpnbypass_config::{
    Config, config_path, load_config, load_config_or_default, save_config, state_dir,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Engine configuration with the DNS cache and route ledger in the state
/// directory.
pub fn engine_config(cfg: &Config) -> EngineConfig {
    cfg.to_engine_config(&state_dir())
}

/// Default daemon log file.
pub fn default_log_path() -> PathBuf {
    state_dir().join("vpnbypass.log")
}

/// Fold `settings` into `cfg` and save it.
pub fn persist_settings(cfg: &mut Config, settings: &Settings) -> Result<(), CliError> {
    cfg.update_from_settings(settings);
    save_config(cfg)?;
    Ok(())
}
