// ── Auto-refresh scheduler ──
//
// Re-runs resolution on a fixed interval and submits only the delta.
// Ticks while the VPN is down, or while another apply is running, are
// skipped; the next tick is scheduled either way.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandResult, Trigger};
use crate::engine::Engine;
use crate::model::Preferences;

/// Shortest refresh interval accepted from preferences.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

pub fn refresh_interval(prefs: &Preferences) -> Duration {
    Duration::from_secs(prefs.refresh_interval_secs).max(MIN_REFRESH_INTERVAL)
}

/// When the next refresh tick is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    interval: Duration,
    next: Instant,
}

impl RefreshSchedule {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_at(&self) -> Instant {
        self.next
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next
    }

    /// Schedule the tick after the one that just fired.
    pub fn advance(&mut self, now: Instant) {
        self.next = now + self.interval;
    }

    /// Change the interval, restarting the countdown from `now`. Returns
    /// `false` if the interval is unchanged.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) -> bool {
        if interval == self.interval {
            return false;
        }
        self.interval = interval;
        self.next = now + interval;
        true
    }

    /// The next tick as wall-clock time, for display.
    pub fn next_wall_clock(&self, now: Instant) -> DateTime<Utc> {
        let remaining = self.next.saturating_duration_since(now);
        Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Background task driving scheduled refreshes until `cancel` fires.
pub(crate) async fn refresh_task(engine: Engine, cancel: CancellationToken) {
    let mut snapshots = engine.subscribe();
    let prefs = engine.snapshot().settings.preferences.clone();
    let mut enabled = prefs.auto_refresh;
    let mut schedule = RefreshSchedule::new(refresh_interval(&prefs), Instant::now());
    publish_next(&engine, enabled, &schedule);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                let Some(snap) = changed else { break };
                let prefs = &snap.settings.preferences;
                let now = Instant::now();
                let interval_changed = schedule.set_interval(refresh_interval(prefs), now);
                if interval_changed || prefs.auto_refresh != enabled {
                    enabled = prefs.auto_refresh;
                    info!(
                        enabled,
                        interval_secs = schedule.interval().as_secs(),
                        "refresh schedule updated"
                    );
                    publish_next(&engine, enabled, &schedule);
                }
            }
            () = tokio::time::sleep_until(schedule.next_at()) => {
                schedule.advance(Instant::now());
                if enabled {
                    tick(&engine).await;
                }
                publish_next(&engine, enabled, &schedule);
            }
        }
    }
    debug!("refresh scheduler stopped");
}

async fn tick(engine: &Engine) {
    if !engine.snapshot().vpn.connected {
        debug!("VPN not connected, scheduled refresh skipped");
        return;
    }
    match engine
        .execute_if_idle(Command::Refresh {
            trigger: Trigger::Scheduled,
        })
        .await
    {
        None => info!("apply in progress, scheduled refresh skipped"),
        Some(Ok(CommandResult::Refreshed(summary))) => debug!(
            added = summary.routes_added,
            removed = summary.routes_removed,
            "scheduled refresh finished"
        ),
        Some(Ok(_)) => {}
        Some(Err(e)) => warn!(error = %e, "scheduled refresh failed"),
    }
}

fn publish_next(engine: &Engine, enabled: bool, schedule: &RefreshSchedule) {
    let next = enabled.then(|| schedule.next_wall_clock(Instant::now()));
    engine.store().publish(|s| s.next_refresh_at = next);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_has_a_floor() {
        let prefs = Preferences {
            refresh_interval_secs: 5,
            ..Preferences::default()
        };
        assert_eq!(refresh_interval(&prefs), MIN_REFRESH_INTERVAL);
        assert_eq!(
            refresh_interval(&Preferences::default()),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn schedule_advances_from_tick_time() {
        let start = Instant::now();
        let mut schedule = RefreshSchedule::new(Duration::from_secs(60), start);
        assert!(!schedule.is_due(start));
        assert!(schedule.is_due(start + Duration::from_secs(60)));

        let late = start + Duration::from_secs(75);
        schedule.advance(late);
        assert_eq!(schedule.next_at(), late + Duration::from_secs(60));
    }

    #[test]
    fn changing_interval_restarts_countdown() {
        let start = Instant::now();
        let mut schedule = RefreshSchedule::new(Duration::from_secs(3600), start);
        let later = start + Duration::from_secs(10);

        assert!(!schedule.set_interval(Duration::from_secs(3600), later));
        assert_eq!(schedule.next_at(), start + Duration::from_secs(3600));

        assert!(schedule.set_interval(Duration::from_secs(600), later));
        assert_eq!(schedule.next_at(), later + Duration::from_secs(600));
    }
}
