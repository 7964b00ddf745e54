use thiserror::Error;

/// Top-level error type for the `vpnbypass-helper` crate.
///
/// Covers every failure mode of talking to the privileged route helper:
/// reaching the socket, the exchange itself, and helper-side rejections.
/// `vpnbypass-core` maps these into engine-level diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Availability ────────────────────────────────────────────────
    /// The helper socket does not exist or refused the connection.
    #[error("Route helper unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    // ── Transport ───────────────────────────────────────────────────
    /// I/O failure while exchanging a request with the helper.
    #[error("Helper transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The helper did not answer in time.
    #[error("Helper request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Helper responses ────────────────────────────────────────────
    /// The helper processed the request and reported a failure.
    #[error("Helper rejected request: {message}")]
    Rejected { message: String },

    /// The helper closed the connection or sent something unexpected.
    #[error("Helper protocol error: {0}")]
    Protocol(String),

    /// JSON deserialization failed, with the raw line for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Local execution (direct fallback) ───────────────────────────
    /// A directly invoked system command exited unsuccessfully.
    #[error("Command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Operation not supported by this executor.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

impl Error {
    /// Returns `true` when the helper could not be reached at all, as
    /// opposed to reaching it and getting a failure back.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
            ),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Helper-supplied error text, if the helper produced any.
    pub fn helper_message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message } => Some(message),
            _ => None,
        }
    }
}
