// ── Runtime engine configuration ──
//
// These types describe *how* the engine talks to the system: probe and
// resolver timeouts, concurrency, executor endpoints. They never touch
// disk. The config crate builds an `EngineConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

/// External tools the probe shells out to. Overridable so tests and
/// unusual installs (Homebrew prefixes) can point elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub dig: String,
    /// TLS-capable resolver used for DoT upstreams. Missing binary means
    /// the DoT tier is skipped.
    pub kdig: String,
    pub tailscale: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            dig: "dig".into(),
            kdig: "kdig".into(),
            tailscale: "tailscale".into(),
        }
    }
}

/// Per-tier DNS timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsTimeouts {
    /// Detected pre-VPN server. Retried once.
    pub primary: Duration,
    pub primary_retries: u32,
    /// Plain fallback servers.
    pub plain: Duration,
    pub doh: Duration,
    pub dot: Duration,
    pub system: Duration,
}

impl Default for DnsTimeouts {
    fn default() -> Self {
        Self {
            primary: Duration::from_millis(1500),
            primary_retries: 1,
            plain: Duration::from_secs(2),
            doh: Duration::from_secs(3),
            dot: Duration::from_secs(3),
            system: Duration::from_secs(3),
        }
    }
}

/// Configuration for one engine instance.
///
/// Built by the CLI from the persisted config; core never reads config files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout for each diagnostic command (ps, ifconfig, networksetup...).
    pub probe_timeout: Duration,
    pub dns: DnsTimeouts,
    pub tools: ToolPaths,
    /// Upper bound on concurrent domain resolutions.
    pub resolve_concurrency: usize,
    /// Upper bound on concurrent verification probes.
    pub verify_concurrency: usize,
    /// Max routes per executor batch call.
    pub batch_size: usize,
    /// A reconnect seen within this window of the last successful apply
    /// does not trigger another apply.
    pub reconnect_cooldown: Duration,
    /// Monitor poll interval. `Duration::ZERO` disables the monitor task.
    pub status_poll_interval: Duration,
    /// Run the auto-refresh scheduler task.
    pub scheduler_enabled: bool,
    /// Apply automatically on disconnected → connected transitions.
    /// One-shot CLI invocations turn this off.
    pub react_to_transitions: bool,
    pub helper_socket: PathBuf,
    pub helper_timeout: Duration,
    pub helper_batch_timeout: Duration,
    /// Hosts file the direct executor splices into.
    pub hosts_path: PathBuf,
    /// Disk resolution cache. `None` keeps the cache in memory only.
    pub dns_cache_path: Option<PathBuf>,
    /// Ledger of installed routes. `None` keeps the active set in memory
    /// only.
    pub routes_path: Option<PathBuf>,
    /// Prefix for privileged commands on the direct path (`sudo -n`).
    pub elevation: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            dns: DnsTimeouts::default(),
            tools: ToolPaths::default(),
            resolve_concurrency: 100,
            verify_concurrency: 16,
            batch_size: 200,
            reconnect_cooldown: Duration::from_secs(5),
            status_poll_interval: Duration::from_secs(10),
            scheduler_enabled: true,
            react_to_transitions: true,
            helper_socket: PathBuf::from(vpnbypass_helper::DEFAULT_SOCKET_PATH),
            helper_timeout: Duration::from_secs(10),
            helper_batch_timeout: Duration::from_secs(120),
            hosts_path: PathBuf::from("/etc/hosts"),
            dns_cache_path: None,
            routes_path: None,
            elevation: vec!["sudo".into(), "-n".into()],
        }
    }
}

impl EngineConfig {
    /// Settings for a single CLI invocation: no background tasks, no
    /// automatic reactions to what the first status check sees.
    pub fn oneshot(mut self) -> Self {
        self.status_poll_interval = Duration::ZERO;
        self.scheduler_enabled = false;
        self.react_to_transitions = false;
        self
    }
}
