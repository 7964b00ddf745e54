//! Client side of the privileged route helper.
//!
//! The helper is a separately installed root process that owns the only
//! privileged operations vpnbypass needs: adding and removing kernel
//! routes, rewriting the managed block of `/etc/hosts`, and flushing the
//! OS DNS cache. This crate defines the wire protocol, the
//! [`RouteExecutor`] abstraction shared with the direct fallback path, and
//! [`HelperClient`], the Unix-socket implementation.

pub mod error;
pub mod executor;
pub mod protocol;

#[cfg(unix)]
mod client;

pub use error::Error;
pub use executor::RouteExecutor;
pub use protocol::{BatchOutcome, HelperRequest, HelperResponse, HostsEntry, RouteSpec};

#[cfg(unix)]
pub use client::HelperClient;

/// Default socket the helper listens on.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/vpnbypass-helper.sock";
