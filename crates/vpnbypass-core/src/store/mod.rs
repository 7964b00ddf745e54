// ── Published engine state ──
//
// The engine owns its working state privately and publishes an
// immutable, versioned `EngineSnapshot` after every mutation. Readers
// never see a half-applied change.

mod ledger;
mod route_table;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::command::{ApplySummary, RefreshSummary};
use crate::executor::ExecutorMode;
use crate::model::{ActiveRoute, RouteVerificationResult, Settings, VpnStatus};
use crate::stream::SnapshotStream;

pub use ledger::{load_routes, save_routes};
pub use route_table::RouteTable;

/// Everything a status display or the persistence layer needs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineSnapshot {
    /// Bumped on every publish.
    pub version: u64,
    pub vpn: VpnStatus,
    pub checked_at: Option<DateTime<Utc>>,
    pub gateway: Option<Ipv4Addr>,
    pub wifi_ssid: Option<String>,
    pub pre_vpn_dns: Option<IpAddr>,
    pub routes: Arc<Vec<ActiveRoute>>,
    /// The VPN dropped since the routes were installed.
    pub routes_stale: bool,
    pub settings: Arc<Settings>,
    /// Bumped only when settings change, so persistence can skip no-ops.
    pub settings_version: u64,
    pub failed_domains: Vec<String>,
    pub last_apply: Option<ApplySummary>,
    pub last_refresh: Option<RefreshSummary>,
    pub next_refresh_at: Option<DateTime<Utc>>,
    /// An apply, refresh or clear is running.
    pub applying: bool,
    pub executor: ExecutorMode,
    pub verification: Arc<Vec<RouteVerificationResult>>,
}

/// Single-writer publisher for [`EngineSnapshot`]s.
pub struct StateStore {
    tx: watch::Sender<Arc<EngineSnapshot>>,
}

impl StateStore {
    pub fn new(initial: EngineSnapshot) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Apply `f` to a copy of the current snapshot and publish it.
    pub fn publish(&self, f: impl FnOnce(&mut EngineSnapshot)) {
        self.tx.send_modify(|current| {
            let snap = Arc::make_mut(current);
            f(snap);
            snap.version += 1;
        });
    }

    /// Publish new settings, bumping the settings version.
    pub fn publish_settings(&self, settings: Settings) {
        self.publish(|s| {
            s.settings = Arc::new(settings);
            s.settings_version += 1;
        });
    }

    pub fn current(&self) -> Arc<EngineSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.tx.subscribe())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn publish_bumps_version() {
        let store = StateStore::new(EngineSnapshot::default());
        store.publish(|s| s.gateway = Some(Ipv4Addr::new(192, 168, 1, 1)));
        let snap = store.current();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.settings_version, 0);
        assert_eq!(snap.gateway, Some(Ipv4Addr::new(192, 168, 1, 1)));
    }

    #[test]
    fn held_snapshots_are_not_mutated() {
        let store = StateStore::new(EngineSnapshot::default());
        let before = store.current();
        store.publish_settings(Settings::default());
        assert_eq!(before.version, 0);
        assert_eq!(store.current().settings_version, 1);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = StateStore::new(EngineSnapshot::default());
        let mut stream = store.subscribe();
        store.publish(|s| s.routes_stale = true);
        let snap = stream.changed().await.unwrap();
        assert!(snap.routes_stale);
    }
}
