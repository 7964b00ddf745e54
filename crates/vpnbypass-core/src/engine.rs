// ── Engine ──
//
// Single owner of settings, the active route set and the DNS cache.
// Every mutation is a `Command` processed one at a time by the command
// processor task; readers only ever see published snapshots. Background
// tasks poll VPN status and drive scheduled refreshes.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vpnbypass_helper::{RouteExecutor, RouteSpec};

use crate::classifier::VpnClassifier;
use crate::command::{
    ApplySummary, BusyGuard, ClearSummary, Command, CommandEnvelope, CommandResult,
    RefreshSummary, Trigger,
};
use crate::config::EngineConfig;
use crate::dns::{DiskDnsCache, DnsResolver, SystemLookup, TokioLookup};
use crate::error::CoreError;
use crate::executor::{DirectExecutor, ExecutorGateway, Submission};
use crate::gateway::GatewayResolver;
use crate::hosts;
use crate::model::{ActiveRoute, Settings, VpnStatus};
use crate::planner::{self, Resolutions, Source};
use crate::probe::{CommandRunner, Probe, SystemRunner};
use crate::scheduler;
use crate::store::{self, EngineSnapshot, RouteTable, StateStore};
use crate::stream::SnapshotStream;
use crate::verify::RouteVerifier;

const COMMAND_CHANNEL_SIZE: usize = 32;

// ── Parts ───────────────────────────────────────────────────────────

/// The engine's seams to the operating system.
pub struct EngineParts {
    pub runner: Arc<dyn CommandRunner>,
    pub lookup: Arc<dyn SystemLookup>,
    /// `None` skips the helper and goes straight to `direct`.
    pub helper: Option<Arc<dyn RouteExecutor>>,
    pub direct: Arc<dyn RouteExecutor>,
    pub disk_cache: Arc<DiskDnsCache>,
}

impl EngineParts {
    /// Real processes, the OS resolver, the helper socket from `config`
    /// and the on-disk cache.
    pub fn system(config: &EngineConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

        #[cfg(unix)]
        let helper: Option<Arc<dyn RouteExecutor>> = Some(Arc::new(vpnbypass_helper::HelperClient::new(
            config.helper_socket.clone(),
            config.helper_timeout,
            config.helper_batch_timeout,
        )));
        #[cfg(not(unix))]
        let helper: Option<Arc<dyn RouteExecutor>> = None;

        let direct = Arc::new(DirectExecutor::new(
            Arc::clone(&runner),
            config.elevation.clone(),
            config.hosts_path.clone(),
            config.helper_timeout,
        ));

        let disk_cache = Arc::new(
            config
                .dns_cache_path
                .as_ref()
                .map_or_else(DiskDnsCache::in_memory, DiskDnsCache::load),
        );

        Self {
            runner,
            lookup: Arc::new(TokioLookup),
            helper,
            direct,
            disk_cache,
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// The bypass routing engine.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Call [`start()`](Self::start)
/// to spawn the command processor and background tasks, and
/// [`shutdown()`](Self::shutdown) to stop them.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    probe: Probe,
    classifier: VpnClassifier,
    gateway: GatewayResolver,
    resolver: Arc<DnsResolver>,
    executor: ExecutorGateway,
    verifier: RouteVerifier,
    store: StateStore,
    state: Mutex<OwnedState>,
    /// Held by the one exclusive command queued or running.
    busy: Arc<AtomicBool>,
    running: AtomicBool,
    last_successful_apply: std::sync::Mutex<Option<Instant>>,
    /// Serializes status checks between the monitor and callers.
    status_lock: Mutex<()>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    command_rx: Mutex<Option<mpsc::Receiver<CommandEnvelope>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// State only the command processor touches.
struct OwnedState {
    settings: Settings,
    routes: RouteTable,
    /// Domain → first resolved IP of the current apply cycle.
    dns_cache: IndexMap<String, Ipv4Addr>,
}

impl Engine {
    /// Engine wired to the real system. Does not start anything.
    pub fn new(config: EngineConfig, settings: Settings) -> Self {
        let parts = EngineParts::system(&config);
        Self::with_parts(config, settings, parts)
    }

    pub fn with_parts(config: EngineConfig, settings: Settings, parts: EngineParts) -> Self {
        let probe = Probe::new(parts.runner, config.probe_timeout, config.tools.clone());
        let resolver = Arc::new(DnsResolver::new(
            probe.clone(),
            parts.lookup,
            parts.disk_cache,
            config.dns.clone(),
            config.resolve_concurrency,
        ));
        resolver.set_fallbacks(&settings.preferences.fallback_dns);

        let mut routes = RouteTable::new();
        if let Some(path) = &config.routes_path {
            routes.replace_all(store::load_routes(path));
        }
        let store = StateStore::new(EngineSnapshot {
            settings: Arc::new(settings.clone()),
            routes: routes.snapshot(),
            ..EngineSnapshot::default()
        });
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);

        Self {
            inner: Arc::new(EngineInner {
                classifier: VpnClassifier::new(probe.clone()),
                gateway: GatewayResolver::new(probe.clone()),
                verifier: RouteVerifier::new(probe.clone(), config.verify_concurrency),
                executor: ExecutorGateway::new(parts.helper, parts.direct, config.batch_size),
                resolver,
                probe,
                store,
                state: Mutex::new(OwnedState {
                    settings,
                    routes,
                    dns_cache: IndexMap::new(),
                }),
                busy: Arc::new(AtomicBool::new(false)),
                running: AtomicBool::new(false),
                last_successful_apply: std::sync::Mutex::new(None),
                status_lock: Mutex::new(()),
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn store(&self) -> &StateStore {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Detect the pre-VPN DNS server, start the command processor, run a
    /// first status check, then spawn the monitor and scheduler tasks the
    /// config asks for.
    pub async fn start(&self) -> Result<(), CoreError> {
        let rx = self
            .inner
            .command_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::Internal("engine already started".into()))?;

        let pre_vpn = self.inner.resolver.detect_pre_vpn_server().await;
        self.inner.store.publish(|s| s.pre_vpn_dns = pre_vpn);

        let config = &self.inner.config;
        let mut handles = Vec::new();
        handles.push(tokio::spawn(command_processor_task(
            self.clone(),
            rx,
            self.inner.cancel.clone(),
        )));
        self.inner.running.store(true, Ordering::Release);

        let status = self.check_status().await;
        if !status.connected && !self.snapshot().routes.is_empty() {
            // recorded by an earlier run, tunnel already gone
            self.inner.store.publish(|s| s.routes_stale = true);
        }

        if !config.status_poll_interval.is_zero() {
            handles.push(tokio::spawn(monitor_task(
                self.clone(),
                config.status_poll_interval,
                self.inner.cancel.clone(),
            )));
        }
        if config.scheduler_enabled {
            handles.push(tokio::spawn(scheduler::refresh_task(
                self.clone(),
                self.inner.cancel.clone(),
            )));
        }

        self.inner.task_handles.lock().await.extend(handles);
        info!("engine started");
        Ok(())
    }

    /// Stop background tasks and wait for them. Commands submitted
    /// afterwards fail with [`CoreError::EngineStopped`].
    pub async fn shutdown(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("engine stopped");
    }

    /// Start, run `f`, shut down. No monitor, scheduler or automatic
    /// apply, whatever `config` says.
    pub async fn oneshot<F, Fut, T>(
        config: EngineConfig,
        settings: Settings,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let engine = Engine::new(config.oneshot(), settings);
        engine.start().await?;
        let result = f(engine.clone()).await;
        engine.shutdown().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.inner.store.current()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        self.inner.store.subscribe()
    }

    // ── Command execution ────────────────────────────────────────

    /// Execute a command through the command processor.
    ///
    /// Apply, refresh and clear fail with [`CoreError::ApplyInProgress`]
    /// while another one is queued or running.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let guard = if cmd.is_exclusive() {
            Some(BusyGuard::try_acquire(&self.inner.busy).ok_or(CoreError::ApplyInProgress)?)
        } else {
            None
        };
        self.send(cmd, guard).await
    }

    /// Like [`execute`](Self::execute) for exclusive commands, but `None`
    /// instead of an error when busy.
    pub(crate) async fn execute_if_idle(
        &self,
        cmd: Command,
    ) -> Option<Result<CommandResult, CoreError>> {
        let guard = BusyGuard::try_acquire(&self.inner.busy)?;
        Some(self.send(cmd, Some(guard)).await)
    }

    async fn send(
        &self,
        command: Command,
        guard: Option<BusyGuard>,
    ) -> Result<CommandResult, CoreError> {
        if !self.inner.running.load(Ordering::Acquire) {
            return Err(CoreError::EngineStopped);
        }
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
                guard,
            })
            .await
            .map_err(|_| CoreError::EngineStopped)?;
        rx.await.map_err(|_| CoreError::EngineStopped)?
    }

    // ── Status ───────────────────────────────────────────────────

    /// Classify the VPN, find the gateway and publish both. A fresh
    /// connection triggers a full apply when auto-apply is on.
    pub async fn check_status(&self) -> VpnStatus {
        let _serial = self.inner.status_lock.lock().await;

        let prior = self.inner.store.current().vpn.clone();
        let status = self.inner.classifier.classify(&prior).await;
        let (gateway, wifi_ssid) = tokio::join!(
            self.inner.gateway.resolve(status.interface.as_deref()),
            self.inner.probe.wifi_ssid(),
        );

        let became_connected = status.connected && !prior.connected;
        let dropped = prior.connected && !status.connected;

        let published = status.clone();
        self.inner.store.publish(|s| {
            s.vpn = published;
            s.gateway = gateway;
            s.wifi_ssid = wifi_ssid;
            s.checked_at = Some(Utc::now());
            if dropped && !s.routes.is_empty() {
                s.routes_stale = true;
            }
        });

        if became_connected {
            info!(
                interface = status.interface.as_deref().unwrap_or(""),
                vpn_type = ?status.vpn_type,
                gateway = ?gateway,
                "VPN connected"
            );
            self.on_connected();
        } else if dropped {
            info!("VPN disconnected, active routes marked stale");
        }
        status
    }

    fn within_cooldown(&self) -> bool {
        let last = *self
            .inner
            .last_successful_apply
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() < self.inner.config.reconnect_cooldown)
    }

    fn mark_applied(&self) {
        *self
            .inner
            .last_successful_apply
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn on_connected(&self) {
        if !self.inner.config.react_to_transitions {
            return;
        }
        if !self.snapshot().settings.preferences.auto_apply {
            debug!("auto-apply disabled, not applying on connect");
            return;
        }
        if self.within_cooldown() {
            info!("reconnect within cooldown of the last apply, skipping");
            return;
        }
        let Some(guard) = BusyGuard::try_acquire(&self.inner.busy) else {
            info!("apply already in progress, skipping reconnect trigger");
            return;
        };

        let engine = self.clone();
        tokio::spawn(async move {
            let cmd = Command::ApplyAll {
                trigger: Trigger::VpnConnected,
            };
            if let Err(e) = engine.send(cmd, Some(guard)).await {
                warn!(error = %e, "automatic apply failed");
            }
        });
    }

    // ── Shared helpers ───────────────────────────────────────────

    fn publish_settings(&self, state: &OwnedState) {
        self.inner.store.publish_settings(state.settings.clone());
    }

    fn publish_routes(&self, state: &OwnedState) {
        let routes = state.routes.snapshot();
        let mode = self.inner.executor.mode();
        self.inner.store.publish(|s| {
            s.routes = routes;
            s.executor = mode;
        });
    }

    /// Connected with a known gateway, or `None`.
    fn route_target(&self) -> Option<Ipv4Addr> {
        let snap = self.snapshot();
        if snap.vpn.connected { snap.gateway } else { None }
    }

    /// Fold fresh resolutions into the cycle cache, the settings and the
    /// disk cache.
    async fn record_resolutions(&self, state: &mut OwnedState, resolutions: &Resolutions) {
        let fresh = planner::first_ips(resolutions);
        if fresh.is_empty() {
            return;
        }
        let now = Utc::now();
        for (domain, ip) in &fresh {
            state.settings.record_resolution(domain, *ip, now);
            state.dns_cache.insert(domain.clone(), *ip);
        }

        let disk = self.inner.resolver.disk_cache();
        if disk.merge(fresh) {
            if let Err(e) = disk.save().await {
                warn!(error = %e, "failed to write DNS cache");
            }
        }
        self.publish_settings(state);
    }

    /// Rewrite the route ledger if the published route set changed.
    async fn persist_routes(&self, before: &Arc<Vec<ActiveRoute>>) {
        let Some(path) = &self.inner.config.routes_path else {
            return;
        };
        let current = self.snapshot().routes.clone();
        if Arc::ptr_eq(before, &current) {
            return;
        }
        if let Err(e) = store::save_routes(path, &current).await {
            warn!(error = %e, "failed to write route ledger");
        }
    }

    async fn sync_hosts(&self, entries: &[vpnbypass_helper::HostsEntry]) {
        if let Err(e) = self.inner.executor.update_hosts(entries).await {
            warn!(error = %e, "hosts file update failed");
        }
        if let Err(e) = self.inner.executor.flush_dns().await {
            warn!(error = %e, "DNS cache flush failed");
        }
    }

    // ── Incremental toggles ──────────────────────────────────────

    /// Resolve one newly enabled source and add its routes.
    async fn add_source(&self, state: &mut OwnedState, source: &Source) {
        let Some(gateway) = self.route_target() else {
            debug!(source = %source.name, "VPN not connected, routes deferred to next apply");
            return;
        };
        let resolutions = planner::resolve_sources(&self.inner.resolver, std::slice::from_ref(source)).await;
        let plan = planner::build_additions(source, &resolutions, &state.routes, gateway, Utc::now());

        let submitted = self.inner.executor.add_routes(&specs(&plan.routes)).await;
        let added = installed(plan.routes, &submitted);
        info!(
            source = %source.name,
            routes = added.len(),
            failed_domains = plan.failed_domains.len(),
            "source enabled"
        );
        for route in added {
            state.routes.insert(route);
        }
        self.record_resolutions(state, &resolutions).await;
        self.publish_routes(state);
    }

    /// Take down every route tagged with `source`. Routes the executor
    /// refused to remove stay tracked.
    async fn remove_source(&self, state: &mut OwnedState, source: &str) {
        let removed = state.routes.remove_source(source);
        if removed.is_empty() {
            return;
        }
        let destinations: Vec<String> = removed.iter().map(|r| r.destination.clone()).collect();
        let submitted = self.inner.executor.remove_routes(&destinations).await;
        let kept = keep_rejected(&mut state.routes, removed, &submitted);
        info!(
            source,
            routes = destinations.len(),
            failed = submitted.outcome.failure_count,
            kept,
            "source disabled"
        );
        self.publish_routes(state);
    }

    /// Rewrite the hosts block from the resolution cache, limited to the
    /// domains of enabled sources.
    async fn resync_hosts(&self, state: &OwnedState) {
        if !state.settings.preferences.manage_hosts {
            return;
        }
        let enabled: HashSet<String> =
            planner::unique_domains(&planner::sources_for(&state.settings))
                .into_iter()
                .collect();
        let mut cache = state.dns_cache.clone();
        cache.retain(|domain, _| enabled.contains(domain));
        self.sync_hosts(&hosts::entries_from_cache(&cache)).await;
    }

    // ── Full apply ───────────────────────────────────────────────

    async fn apply_all(
        &self,
        state: &mut OwnedState,
        trigger: Trigger,
    ) -> Result<CommandResult, CoreError> {
        let snap = self.snapshot();
        if !snap.vpn.connected {
            return Err(CoreError::VpnNotConnected);
        }
        let gateway = snap.gateway.ok_or(CoreError::NoGateway)?;
        let started = Instant::now();
        self.inner.store.publish(|s| s.applying = true);

        state.dns_cache.clear();
        let sources = planner::sources_for(&state.settings);
        let resolutions = planner::resolve_sources(&self.inner.resolver, &sources).await;
        let plan = planner::build_plan(&sources, &resolutions, gateway, Utc::now());
        let routes_planned = plan.routes.len();

        // destinations the new plan drops, or that point at an old gateway
        let planned: HashSet<&str> = plan.routes.iter().map(|r| r.destination.as_str()).collect();
        let stale: Vec<String> = state
            .routes
            .iter()
            .filter(|r| r.gateway != gateway || !planned.contains(r.destination.as_str()))
            .map(|r| r.destination.clone())
            .collect();
        let removed = self.inner.executor.remove_routes(&stale).await;

        // stale routes the executor refused to take down are still installed
        let mut table: Vec<ActiveRoute> = state
            .routes
            .iter()
            .filter(|r| !removed.was_applied(&r.destination))
            .cloned()
            .collect();
        let mut submit = Vec::new();
        let mut routes_kept = 0;
        for route in plan.routes {
            match state.routes.get(&route.destination) {
                Some(active) if active.gateway == gateway => {
                    routes_kept += 1;
                    table.push(ActiveRoute {
                        created_at: active.created_at,
                        ..route
                    });
                }
                Some(_) if !removed.was_applied(&route.destination) => {}
                _ => submit.push(route),
            }
        }
        let added = self.inner.executor.add_routes(&specs(&submit)).await;
        table.extend(installed(submit, &added));

        state.routes.replace_all(table);
        self.record_resolutions(state, &resolutions).await;

        let prefs = state.settings.preferences.clone();
        if prefs.manage_hosts {
            self.sync_hosts(&hosts::entries_from_cache(&state.dns_cache))
                .await;
        }

        let summary = ApplySummary {
            trigger,
            routes_planned,
            routes_kept,
            routes_added: added.outcome.success_count,
            routes_failed: added.outcome.failure_count,
            routes_removed: removed.outcome.success_count,
            failed_domains: plan.failed_domains,
            executor_error: added.outcome.error.or(removed.outcome.error),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            finished_at: Utc::now(),
        };
        self.mark_applied();

        info!(
            %trigger,
            planned = summary.routes_planned,
            kept = summary.routes_kept,
            added = summary.routes_added,
            failed = summary.routes_failed,
            removed = summary.routes_removed,
            failed_domains = summary.failed_domains.len(),
            duration_ms = summary.duration_ms,
            "apply finished"
        );

        let routes = state.routes.snapshot();
        let mode = self.inner.executor.mode();
        let published = summary.clone();
        self.inner.store.publish(|s| {
            s.routes = routes;
            s.routes_stale = false;
            s.failed_domains.clone_from(&published.failed_domains);
            s.last_apply = Some(published);
            s.executor = mode;
            s.applying = false;
        });

        if prefs.verify_after_apply {
            self.verify(state).await;
        }
        Ok(CommandResult::Applied(summary))
    }

    // ── Refresh ──────────────────────────────────────────────────

    async fn refresh(
        &self,
        state: &mut OwnedState,
        trigger: Trigger,
    ) -> Result<CommandResult, CoreError> {
        let snap = self.snapshot();
        if !snap.vpn.connected {
            return Ok(CommandResult::Skipped {
                reason: "VPN not connected".into(),
            });
        }
        let Some(gateway) = snap.gateway else {
            return Ok(CommandResult::Skipped {
                reason: "no local gateway".into(),
            });
        };
        self.inner.store.publish(|s| s.applying = true);

        let sources = planner::sources_for(&state.settings);
        let resolutions = planner::resolve_sources(&self.inner.resolver, &sources).await;
        let delta =
            planner::build_refresh_delta(&sources, &resolutions, &state.routes, gateway, Utc::now());

        let removed = self.inner.executor.remove_routes(&delta.remove).await;
        for destination in &delta.remove {
            if removed.was_applied(destination) {
                state.routes.remove(destination);
            }
        }
        // an address whose old route could not be taken down stays with
        // its old owner
        let additions: Vec<ActiveRoute> = delta
            .add
            .into_iter()
            .filter(|r| !state.routes.contains(&r.destination))
            .collect();
        let added = self.inner.executor.add_routes(&specs(&additions)).await;
        for route in installed(additions, &added) {
            state.routes.insert(route);
        }

        self.record_resolutions(state, &resolutions).await;
        let changed = removed.outcome.success_count + added.outcome.success_count > 0;
        if changed {
            self.resync_hosts(state).await;
        }

        let summary = RefreshSummary {
            trigger,
            routes_added: added.outcome.success_count,
            routes_removed: removed.outcome.success_count,
            failed_domains: delta.failed_domains,
            executor_error: added.outcome.error.or(removed.outcome.error),
            finished_at: Utc::now(),
        };
        info!(
            %trigger,
            added = summary.routes_added,
            removed = summary.routes_removed,
            failed_domains = summary.failed_domains.len(),
            "refresh finished"
        );

        let routes = state.routes.snapshot();
        let mode = self.inner.executor.mode();
        let published = summary.clone();
        self.inner.store.publish(|s| {
            s.routes = routes;
            s.failed_domains.clone_from(&published.failed_domains);
            s.last_refresh = Some(published);
            s.executor = mode;
            s.applying = false;
        });
        Ok(CommandResult::Refreshed(summary))
    }

    // ── Clear / verify ───────────────────────────────────────────

    async fn clear(&self, state: &mut OwnedState) -> CommandResult {
        self.inner.store.publish(|s| s.applying = true);
        let destinations = state.routes.destinations();
        let submitted = self.inner.executor.remove_routes(&destinations).await;
        let cleared = state.routes.clear();
        let kept = keep_rejected(&mut state.routes, cleared, &submitted);

        if state.settings.preferences.manage_hosts {
            if let Err(e) = self.inner.executor.update_hosts(&[]).await {
                warn!(error = %e, "clearing hosts block failed");
            }
        }
        if let Err(e) = self.inner.executor.flush_dns().await {
            warn!(error = %e, "DNS cache flush failed");
        }
        info!(
            removed = submitted.outcome.success_count,
            failed = submitted.outcome.failure_count,
            kept,
            "routes cleared"
        );

        let routes = state.routes.snapshot();
        let mode = self.inner.executor.mode();
        self.inner.store.publish(|s| {
            s.routes = routes;
            s.routes_stale = false;
            s.verification = Arc::new(Vec::new());
            s.executor = mode;
            s.applying = false;
        });
        CommandResult::Cleared(ClearSummary {
            routes_removed: submitted.outcome.success_count,
            routes_failed: submitted.outcome.failure_count,
            executor_error: submitted.outcome.error,
        })
    }

    async fn verify(&self, state: &OwnedState) -> CommandResult {
        let routes: Vec<ActiveRoute> = state.routes.iter().cloned().collect();
        let results = self.inner.verifier.verify(&routes).await;
        let reachable = results.iter().filter(|r| r.reachable).count();
        info!(checked = results.len(), reachable, "verification finished");

        let published = Arc::new(results.clone());
        self.inner.store.publish(|s| s.verification = published);
        CommandResult::Verified(results)
    }
}

fn specs(routes: &[ActiveRoute]) -> Vec<RouteSpec> {
    routes.iter().map(ActiveRoute::to_spec).collect()
}

/// Routes to record as active after an add.
fn installed(routes: Vec<ActiveRoute>, submitted: &Submission) -> Vec<ActiveRoute> {
    routes
        .into_iter()
        .filter(|r| submitted.was_applied(&r.destination))
        .collect()
}

/// Put back routes whose removal was rejected. Returns how many.
fn keep_rejected(table: &mut RouteTable, removed: Vec<ActiveRoute>, submitted: &Submission) -> usize {
    let mut kept = 0;
    for route in removed {
        if !submitted.was_applied(&route.destination) && table.insert(route) {
            kept += 1;
        }
    }
    kept
}

// ── Background tasks ─────────────────────────────────────────────────

/// Re-check VPN status every `period`.
async fn monitor_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // start() already ran the first check

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                engine.check_status().await;
            }
        }
    }
}

/// Process commands one at a time until cancelled.
async fn command_processor_task(
    engine: Engine,
    mut rx: mpsc::Receiver<CommandEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(CommandEnvelope { command, response_tx, guard }) = envelope else { break };
                let before = engine.snapshot().routes.clone();
                let result = route_command(&engine, command).await;
                engine.persist_routes(&before).await;
                // release before replying so the caller can submit again
                drop(guard);
                let _ = response_tx.send(result);
            }
        }
    }
}

// ── Command routing ──────────────────────────────────────────────────

async fn route_command(engine: &Engine, cmd: Command) -> Result<CommandResult, CoreError> {
    let mut state = engine.inner.state.lock().await;

    match cmd {
        // ── Domains ──────────────────────────────────────────────
        Command::AddDomain { domain } => {
            let entry = state.settings.add_domain(&domain)?;
            info!(domain = %entry.domain, "domain added");
            engine.publish_settings(&state);
            engine.add_source(&mut state, &Source::from_domain(&entry)).await;
            engine.resync_hosts(&state).await;
            Ok(CommandResult::Domain(entry))
        }

        Command::RemoveDomain { key } => {
            let entry = state.settings.remove_domain(&key)?;
            info!(domain = %entry.domain, "domain removed");
            engine.publish_settings(&state);
            engine.remove_source(&mut state, &entry.domain).await;
            engine.resync_hosts(&state).await;
            Ok(CommandResult::Domain(entry))
        }

        Command::SetDomainEnabled { key, enabled } => {
            let entry = state.settings.set_domain_enabled(&key, enabled)?;
            engine.publish_settings(&state);
            if enabled {
                engine.add_source(&mut state, &Source::from_domain(&entry)).await;
            } else {
                engine.remove_source(&mut state, &entry.domain).await;
            }
            engine.resync_hosts(&state).await;
            Ok(CommandResult::Domain(entry))
        }

        // ── Services ─────────────────────────────────────────────
        Command::SetServiceEnabled { key, enabled } => {
            let service = state.settings.set_service_enabled(&key, enabled)?;
            engine.publish_settings(&state);
            if enabled {
                engine.add_source(&mut state, &Source::from_service(&service)).await;
            } else {
                engine.remove_source(&mut state, &service.name).await;
            }
            engine.resync_hosts(&state).await;
            Ok(CommandResult::Service(service))
        }

        // ── Preferences ──────────────────────────────────────────
        Command::UpdatePreferences(prefs) => {
            let hosts_dropped = state.settings.preferences.manage_hosts && !prefs.manage_hosts;
            engine.inner.resolver.set_fallbacks(&prefs.fallback_dns);
            state.settings.preferences = prefs;
            engine.publish_settings(&state);
            if hosts_dropped {
                engine.sync_hosts(&[]).await;
            }
            Ok(CommandResult::Ok)
        }

        // ── Routes ───────────────────────────────────────────────
        Command::ApplyAll { trigger } => engine.apply_all(&mut state, trigger).await,
        Command::Refresh { trigger } => engine.refresh(&mut state, trigger).await,
        Command::ClearRoutes => Ok(engine.clear(&mut state).await),
        Command::VerifyRoutes => Ok(engine.verify(&state).await),
    }
}
