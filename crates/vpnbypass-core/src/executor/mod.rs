// ── Route application gateway ──
//
// The only path from the engine to anything privileged. Prefers the
// installed helper; when it cannot be reached, switches once to the
// direct executor and stays there for the rest of the process.

mod direct;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, info, warn};
use vpnbypass_helper::{BatchOutcome, Error as HelperError, HostsEntry, RouteExecutor, RouteSpec};

use crate::error::CoreError;

pub use direct::DirectExecutor;

/// Which executor the gateway is submitting to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorMode {
    /// Nothing submitted yet.
    #[default]
    Unknown,
    Helper { version: String },
    Direct { reason: String },
}

impl ExecutorMode {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Direct { .. })
    }
}

impl fmt::Display for ExecutorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("not probed"),
            Self::Helper { version } => write!(f, "helper {version}"),
            Self::Direct { reason } => write!(f, "direct ({reason})"),
        }
    }
}

/// An executor picked for one submission.
struct Active {
    exec: Arc<dyn RouteExecutor>,
    via_helper: bool,
}

/// Batches route mutations and routes them to the helper or the direct
/// fallback.
pub struct ExecutorGateway {
    helper: Option<Arc<dyn RouteExecutor>>,
    direct: Arc<dyn RouteExecutor>,
    batch_size: usize,
    mode: Mutex<ExecutorMode>,
}

impl ExecutorGateway {
    pub fn new(
        helper: Option<Arc<dyn RouteExecutor>>,
        direct: Arc<dyn RouteExecutor>,
        batch_size: usize,
    ) -> Self {
        Self {
            helper,
            direct,
            batch_size: batch_size.max(1),
            mode: Mutex::new(ExecutorMode::Unknown),
        }
    }

    pub fn mode(&self) -> ExecutorMode {
        self.mode
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn set_mode(&self, mode: ExecutorMode) {
        if let Ok(mut guard) = self.mode.lock() {
            *guard = mode;
        }
    }

    /// Resolve the executor to use, probing the helper on first use.
    async fn active(&self) -> Active {
        let direct = Active {
            exec: Arc::clone(&self.direct),
            via_helper: false,
        };
        let Some(helper) = &self.helper else {
            if self.mode() == ExecutorMode::Unknown {
                self.set_mode(ExecutorMode::Direct {
                    reason: "helper not configured".into(),
                });
            }
            return direct;
        };

        match self.mode() {
            ExecutorMode::Helper { .. } => Active {
                exec: Arc::clone(helper),
                via_helper: true,
            },
            ExecutorMode::Direct { .. } => direct,
            ExecutorMode::Unknown => match helper.version().await {
                Ok(version) => {
                    info!(%version, "using route helper");
                    self.set_mode(ExecutorMode::Helper { version });
                    Active {
                        exec: Arc::clone(helper),
                        via_helper: true,
                    }
                }
                Err(e) => {
                    self.degrade(&e);
                    direct
                }
            },
        }
    }

    /// Switch to the direct path. Logs only on the first switch.
    fn degrade(&self, err: &HelperError) {
        let Ok(mut mode) = self.mode.lock() else {
            return;
        };
        if mode.is_degraded() {
            return;
        }
        warn!(error = %err, "route helper unavailable, falling back to direct commands");
        *mode = ExecutorMode::Direct {
            reason: err.to_string(),
        };
    }

    /// Submit `routes` in batches. Per-item failures are counted, never
    /// returned as an error.
    pub async fn add_routes(&self, routes: &[RouteSpec]) -> Submission {
        let mut total = Submission::default();
        for chunk in routes.chunks(self.batch_size) {
            let active = self.active().await;
            let result = match active.exec.add_routes_batch(chunk).await {
                Err(e) if active.via_helper && e.is_unavailable() => {
                    self.degrade(&e);
                    self.direct.add_routes_batch(chunk).await
                }
                other => other,
            };
            total.record(
                into_outcome(result, chunk.len(), "add"),
                chunk.iter().map(|r| r.destination.as_str()),
            );
        }
        if !total.outcome.is_clean() {
            warn!(
                added = total.outcome.success_count,
                failed = total.outcome.failure_count,
                error = total.outcome.error.as_deref().unwrap_or(""),
                "some routes were not added"
            );
        }
        total
    }

    /// Remove `destinations` in batches.
    pub async fn remove_routes(&self, destinations: &[String]) -> Submission {
        let mut total = Submission::default();
        for chunk in destinations.chunks(self.batch_size) {
            let active = self.active().await;
            let result = match active.exec.remove_routes_batch(chunk).await {
                Err(e) if active.via_helper && e.is_unavailable() => {
                    self.degrade(&e);
                    self.direct.remove_routes_batch(chunk).await
                }
                other => other,
            };
            total.record(
                into_outcome(result, chunk.len(), "remove"),
                chunk.iter().map(String::as_str),
            );
        }
        if !total.outcome.is_clean() {
            warn!(
                removed = total.outcome.success_count,
                failed = total.outcome.failure_count,
                error = total.outcome.error.as_deref().unwrap_or(""),
                "some routes were not removed"
            );
        }
        total
    }

    /// Replace the managed hosts block. An empty slice clears it.
    pub async fn update_hosts(&self, entries: &[HostsEntry]) -> Result<(), CoreError> {
        let active = self.active().await;
        let result = match active.exec.update_hosts_file(entries).await {
            Err(e) if active.via_helper && e.is_unavailable() => {
                self.degrade(&e);
                self.direct.update_hosts_file(entries).await
            }
            other => other,
        };
        debug!(entries = entries.len(), ok = result.is_ok(), "hosts file update");
        result.map_err(CoreError::from)
    }

    pub async fn flush_dns(&self) -> Result<(), CoreError> {
        let active = self.active().await;
        let result = match active.exec.flush_dns_cache().await {
            Err(e) if active.via_helper && e.is_unavailable() => {
                self.degrade(&e);
                self.direct.flush_dns_cache().await
            }
            other => other,
        };
        result.map_err(CoreError::from)
    }
}

/// Result of a batched submission.
///
/// Batch replies carry counts only. A chunk where nothing succeeded is
/// known to have been rejected item by item; a partially failed chunk
/// cannot say which items failed and is treated as applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub outcome: BatchOutcome,
    /// Destinations from chunks that were rejected outright.
    pub rejected: HashSet<String>,
}

impl Submission {
    fn record<'a>(&mut self, outcome: BatchOutcome, destinations: impl Iterator<Item = &'a str>) {
        if outcome.success_count == 0 && outcome.failure_count > 0 {
            self.rejected.extend(destinations.map(str::to_owned));
        }
        self.outcome.merge(outcome);
    }

    pub fn was_applied(&self, destination: &str) -> bool {
        !self.rejected.contains(destination)
    }
}

fn into_outcome(
    result: Result<BatchOutcome, HelperError>,
    len: usize,
    op: &'static str,
) -> BatchOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(op, routes = len, error = %e, "route batch failed");
            BatchOutcome {
                success_count: 0,
                failure_count: u32::try_from(len).unwrap_or(u32::MAX),
                error: Some(e.helper_message().map_or_else(|| e.to_string(), str::to_owned)),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::testing::{ExecCall, RecordingExecutor};

    const GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    fn specs(n: u8) -> Vec<RouteSpec> {
        (1..=n)
            .map(|i| RouteSpec::host(Ipv4Addr::new(10, 0, 0, i), GW))
            .collect()
    }

    #[tokio::test]
    async fn helper_is_used_when_reachable() {
        let helper = Arc::new(RecordingExecutor::default());
        let direct = Arc::new(RecordingExecutor::default());
        let gw = ExecutorGateway::new(Some(helper.clone()), direct.clone(), 200);

        let submitted = gw.add_routes(&specs(3)).await;

        assert_eq!(submitted.outcome.success_count, 3);
        assert!(submitted.rejected.is_empty());
        assert_eq!(helper.add_batches().len(), 1);
        assert!(direct.calls().is_empty());
        assert_eq!(
            gw.mode(),
            ExecutorMode::Helper {
                version: "test".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_helper_degrades_to_direct() {
        let helper = Arc::new(RecordingExecutor::unavailable());
        let direct = Arc::new(RecordingExecutor::default());
        let gw = ExecutorGateway::new(Some(helper), direct.clone(), 200);

        let submitted = gw.add_routes(&specs(2)).await;
        assert_eq!(submitted.outcome.success_count, 2);
        assert!(gw.mode().is_degraded());

        gw.flush_dns().await.unwrap();
        assert_eq!(direct.calls().last(), Some(&ExecCall::Flush));
    }

    #[tokio::test]
    async fn batches_are_chunked() {
        let direct = Arc::new(RecordingExecutor::default());
        let gw = ExecutorGateway::new(None, direct.clone(), 2);

        gw.add_routes(&specs(5)).await;

        let sizes: Vec<usize> = direct.add_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(
            gw.mode(),
            ExecutorMode::Direct {
                reason: "helper not configured".into()
            }
        );
    }

    #[tokio::test]
    async fn failed_batch_is_counted_not_returned() {
        let direct = Arc::new(RecordingExecutor::unavailable());
        let gw = ExecutorGateway::new(None, direct, 200);

        let submitted = gw.remove_routes(&["1.2.3.4".into(), "5.6.7.8".into()]).await;

        assert_eq!(submitted.outcome.failure_count, 2);
        assert!(submitted.outcome.error.is_some());
        assert!(!submitted.was_applied("1.2.3.4"));
        assert!(!submitted.was_applied("5.6.7.8"));
    }

    #[tokio::test]
    async fn only_wholly_rejected_chunks_are_marked() {
        let direct = Arc::new(RecordingExecutor::default());
        direct.reject("10.0.0.1");
        direct.reject("10.0.0.2");
        direct.reject("10.0.0.3");
        let gw = ExecutorGateway::new(None, direct, 2);

        let submitted = gw.add_routes(&specs(4)).await;

        assert_eq!(submitted.outcome.success_count, 1);
        assert_eq!(submitted.outcome.failure_count, 3);
        // first chunk failed whole, second only in part
        assert!(!submitted.was_applied("10.0.0.1"));
        assert!(!submitted.was_applied("10.0.0.2"));
        assert!(submitted.was_applied("10.0.0.3"));
        assert!(submitted.was_applied("10.0.0.4"));
    }
}
