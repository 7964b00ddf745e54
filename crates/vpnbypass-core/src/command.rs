// ── Command API ──
//
// Every mutation of settings or of the active route set flows through a
// `Command`. The engine's command processor handles them one at a time,
// which is what serializes applies, refreshes and toggles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use crate::error::CoreError;
use crate::model::{DomainEntry, Preferences, RouteVerificationResult, ServiceEntry};

/// A command envelope sent through the command channel.
pub(crate) struct CommandEnvelope {
    pub command: Command,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
    /// Held while an exclusive command is queued or running.
    pub guard: Option<BusyGuard>,
}

/// What caused a full apply or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    Manual,
    VpnConnected,
    Scheduled,
}

#[derive(Debug, Clone)]
pub enum Command {
    // ── Domains ──────────────────────────────────────────────────────
    AddDomain { domain: String },
    RemoveDomain { key: String },
    SetDomainEnabled { key: String, enabled: bool },

    // ── Services ─────────────────────────────────────────────────────
    SetServiceEnabled { key: String, enabled: bool },

    // ── Preferences ──────────────────────────────────────────────────
    UpdatePreferences(Preferences),

    // ── Routes ───────────────────────────────────────────────────────
    ApplyAll { trigger: Trigger },
    Refresh { trigger: Trigger },
    ClearRoutes,
    VerifyRoutes,
}

impl Command {
    /// Commands that rebuild or reconcile the whole route set. At most one
    /// of these may be queued or running at a time.
    pub fn is_exclusive(&self) -> bool {
        matches!(
            self,
            Self::ApplyAll { .. } | Self::Refresh { .. } | Self::ClearRoutes
        )
    }
}

/// Result of a command execution.
#[derive(Debug)]
pub enum CommandResult {
    Ok,
    Domain(DomainEntry),
    Service(ServiceEntry),
    Applied(ApplySummary),
    Refreshed(RefreshSummary),
    Cleared(ClearSummary),
    Verified(Vec<RouteVerificationResult>),
    /// The command was accepted but had nothing to do.
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub trigger: Trigger,
    pub routes_planned: usize,
    /// Planned routes that were already installed and left in place.
    pub routes_kept: usize,
    pub routes_added: u32,
    pub routes_failed: u32,
    /// Stale routes from the previous apply that were taken down.
    pub routes_removed: u32,
    pub failed_domains: Vec<String>,
    /// First error text reported by the executor.
    pub executor_error: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub trigger: Trigger,
    pub routes_added: u32,
    pub routes_removed: u32,
    pub failed_domains: Vec<String>,
    pub executor_error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub routes_removed: u32,
    pub routes_failed: u32,
    pub executor_error: Option<String>,
}

// ── Busy guard ──────────────────────────────────────────────────────

/// Resets the engine's busy flag when dropped, so an exclusive command
/// releases it whether it completes, fails, or is discarded unprocessed.
#[derive(Debug)]
pub(crate) struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    /// Claim `flag`, or `None` if already held.
    pub(crate) fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_exclusive_until_dropped() {
        let flag = Arc::new(AtomicBool::new(false));
        let first = BusyGuard::try_acquire(&flag);
        assert!(first.is_some());
        assert!(BusyGuard::try_acquire(&flag).is_none());
        drop(first);
        assert!(BusyGuard::try_acquire(&flag).is_some());
    }

    #[test]
    fn only_route_set_commands_are_exclusive() {
        assert!(Command::ApplyAll { trigger: Trigger::Manual }.is_exclusive());
        assert!(Command::ClearRoutes.is_exclusive());
        assert!(!Command::VerifyRoutes.is_exclusive());
        assert!(
            !Command::SetServiceEnabled {
                key: "telegram".into(),
                enabled: true
            }
            .is_exclusive()
        );
    }
}
