// ── Core error types ──
//
// User-facing errors from vpnbypass-core. Probe and resolver failures
// stay inside the engine (they degrade, they don't abort); what escapes
// here is what a CLI or menu surface has to show. The
// `From<vpnbypass_helper::Error>` impl translates executor failures.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── State errors ─────────────────────────────────────────────────
    #[error("An apply or refresh is already in progress")]
    ApplyInProgress,

    #[error("VPN is not connected")]
    VpnNotConnected,

    #[error("Could not determine the local gateway")]
    NoGateway,

    #[error("Engine is not running")]
    EngineStopped,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Domain not found: {identifier}")]
    DomainNotFound { identifier: String },

    #[error("Service not found: {identifier}")]
    ServiceNotFound { identifier: String },

    #[error("Domain already configured: {domain}")]
    DuplicateDomain { domain: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Executor errors ──────────────────────────────────────────────
    #[error("Route executor unavailable: {reason}")]
    ExecutorUnavailable { reason: String },

    #[error("Route executor failed: {message}")]
    Executor { message: String },

    #[error("Executor timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

// ── Conversion from executor errors ──────────────────────────────────

impl From<vpnbypass_helper::Error> for CoreError {
    fn from(err: vpnbypass_helper::Error) -> Self {
        use vpnbypass_helper::Error as H;
        match err {
            H::Unavailable { path, reason } => CoreError::ExecutorUnavailable {
                reason: format!("{path}: {reason}"),
            },
            H::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            H::Rejected { message } => CoreError::Executor { message },
            H::CommandFailed { command, stderr } => CoreError::Executor {
                message: format!("`{command}` failed: {stderr}"),
            },
            H::Transport(e) => CoreError::Executor {
                message: format!("transport: {e}"),
            },
            H::Protocol(message) => CoreError::Executor { message },
            H::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            H::UnsupportedOperation(op) => CoreError::Executor {
                message: format!("unsupported operation: {op}"),
            },
        }
    }
}
