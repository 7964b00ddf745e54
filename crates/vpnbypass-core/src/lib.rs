//! VPN bypass routing engine.
//!
//! Keeps selected domains and service IP ranges on the regular (non-VPN)
//! gateway while a full-tunnel VPN is up:
//!
//! - **[`Engine`]**: central facade. [`start()`](Engine::start) detects
//!   the pre-VPN DNS server, runs a first status check, then spawns the
//!   command processor, the VPN monitor and the refresh scheduler.
//!   [`Engine::oneshot()`](Engine::oneshot) runs a single CLI action with
//!   no background tasks.
//!
//! - **[`Command`]**: typed mutation requests routed through an `mpsc`
//!   channel to the command processor, which owns settings, the active
//!   route table and the DNS cache. Reads go through published
//!   [`EngineSnapshot`]s instead.
//!
//! - **[`SnapshotStream`]**: subscription handle over snapshots, with
//!   `current()` / `latest()` / `changed()`.
//!
//! - **Resolution and routing**: [`DnsResolver`] walks the tiered
//!   upstream chain, [`planner`] turns answers into routes, and
//!   [`ExecutorGateway`] installs them through the privileged helper or,
//!   failing that, direct `route` commands.

pub mod catalog;
pub mod classifier;
pub mod command;
pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod hosts;
pub mod model;
pub mod planner;
pub mod probe;
pub mod scheduler;
pub mod store;
pub mod stream;
pub mod verify;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{ApplySummary, ClearSummary, Command, CommandResult, RefreshSummary, Trigger};
pub use config::{DnsTimeouts, EngineConfig, ToolPaths};
pub use dns::{DiskDnsCache, DnsResolver, Resolution, Tier, Upstream};
pub use engine::{Engine, EngineParts};
pub use error::CoreError;
pub use executor::{DirectExecutor, ExecutorGateway, ExecutorMode, Submission};
pub use store::EngineSnapshot;
pub use stream::SnapshotStream;

pub use model::{
    ActiveRoute, DomainEntry, Preferences, RouteVerificationResult, ServiceEntry, Settings,
    VpnStatus, VpnType,
};
