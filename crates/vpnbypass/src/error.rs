//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use vpnbypass_config::ConfigError;
use vpnbypass_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const BUSY: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Network state ────────────────────────────────────────────────
    #[error("VPN is not connected")]
    #[diagnostic(
        code(vpnbypass::vpn_not_connected),
        help(
            "Bypass routes only make sense while a full-tunnel VPN is up.\n\
             Connect the VPN, or leave `vpnbypass run` going to apply on connect."
        )
    )]
    VpnNotConnected,

    #[error("Could not determine the local gateway")]
    #[diagnostic(
        code(vpnbypass::no_gateway),
        help("Check that Wi-Fi or Ethernet is connected. Try: vpnbypass status -v")
    )]
    NoGateway,

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(vpnbypass::not_found),
        help("Run: vpnbypass {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(vpnbypass::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Route executor ───────────────────────────────────────────────
    #[error("Cannot change routes: {reason}")]
    #[diagnostic(
        code(vpnbypass::executor_unavailable),
        help(
            "Install and start the vpnbypass helper, or allow passwordless\n\
             `sudo -n route` for the direct fallback."
        )
    )]
    ExecutorUnavailable { reason: String },

    #[error("Route change failed: {message}")]
    #[diagnostic(code(vpnbypass::executor))]
    Executor { message: String },

    #[error("An apply, refresh or clear is already running")]
    #[diagnostic(
        code(vpnbypass::busy),
        help("Wait for it to finish and try again.")
    )]
    Busy,

    #[error("Timed out after {seconds}s")]
    #[diagnostic(code(vpnbypass::timeout))]
    Timeout { seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vpnbypass::validation))]
    Validation { field: String, reason: String },

    #[error("Unknown setting '{key}'")]
    #[diagnostic(
        code(vpnbypass::unknown_setting),
        help(
            "Known settings: auto_apply, manage_hosts, verify_after_apply,\n\
             auto_refresh, refresh_interval, fallback_dns"
        )
    )]
    UnknownSetting { key: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    #[diagnostic(code(vpnbypass::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(vpnbypass::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization / Internal ────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(vpnbypass::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(vpnbypass::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(vpnbypass::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::VpnNotConnected | Self::NoGateway => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::ExecutorUnavailable { .. } => exit_code::PERMISSION,
            Self::Busy => exit_code::BUSY,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::UnknownSetting { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ApplyInProgress => CliError::Busy,
            CoreError::VpnNotConnected => CliError::VpnNotConnected,
            CoreError::NoGateway => CliError::NoGateway,

            CoreError::DomainNotFound { identifier } => CliError::NotFound {
                resource_type: "domain".into(),
                identifier,
                list_command: "domains list".into(),
            },

            CoreError::ServiceNotFound { identifier } => CliError::NotFound {
                resource_type: "service".into(),
                identifier,
                list_command: "services list".into(),
            },

            CoreError::DuplicateDomain { domain } => CliError::Conflict {
                resource_type: "domain".into(),
                identifier: domain,
            },

            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::ExecutorUnavailable { reason } => CliError::ExecutorUnavailable { reason },
            CoreError::Executor { message } => CliError::Executor { message },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::EngineStopped => CliError::Internal("engine stopped unexpectedly".into()),
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownKey { key } => CliError::UnknownSetting { key },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}
