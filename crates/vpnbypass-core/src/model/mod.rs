// ── Domain model ──
//
// Canonical types shared by the engine, the config crate and the CLI.
// Everything here is a plain value object; the engine owns the live
// instances and publishes read-only snapshots of them.

pub mod domain;
pub mod route;
pub mod service;
pub mod settings;
pub mod vpn;

// ── Re-exports ──────────────────────────────────────────────────────

pub use domain::{DomainEntry, normalize_domain, validate_domain};
pub use route::{ActiveRoute, RouteVerificationResult};
pub use service::ServiceEntry;
pub use settings::{Preferences, Settings};
pub use vpn::{VpnStatus, VpnType};
