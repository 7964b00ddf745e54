// ── System probe ──
//
// Runs short-lived diagnostic commands and turns their output into
// structured facts. Every invocation carries an explicit timeout; on
// timeout the child is killed and the call yields no data.

mod parse;

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ToolPaths;

pub use parse::{
    DefaultRoute, InterfaceBlock, ResolverBlock, RouteLookup, parse_airport_ssid,
    parse_exit_node_status, parse_interfaces, parse_ipv4_tokens, parse_netstat_defaults,
    parse_ping_latency, parse_process_names, parse_route_get, parse_router_field,
    parse_scutil_dns,
};

/// Why a diagnostic command produced no usable output.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("`{program}` is not installed")]
    NotFound { program: String },

    #[error("`{program}` timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },

    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("`{program}` could not be run: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProbeError {
    /// The tool itself is absent, as opposed to failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Seam between the engine and the operating system's command line.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args…` and return its stdout. Non-zero exit is an error.
    async fn run(&self, program: &str, args: &[&str], timeout: Duration)
    -> Result<String, ProbeError>;
}

/// Runs real processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, ProbeError> {
        trace!(program, ?args, "exec");
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Err(_) => {
                return Err(ProbeError::Timeout {
                    program: program.to_owned(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::NotFound {
                    program: program.to_owned(),
                });
            }
            Ok(Err(source)) => {
                return Err(ProbeError::Io {
                    program: program.to_owned(),
                    source,
                });
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(ProbeError::Failed {
                program: program.to_owned(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Typed queries over a [`CommandRunner`].
#[derive(Clone)]
pub struct Probe {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    tools: ToolPaths,
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("timeout", &self.timeout)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl Probe {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration, tools: ToolPaths) -> Self {
        Self {
            runner,
            timeout,
            tools,
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Run with the default probe timeout, logging failures at debug.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    pub async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, ProbeError> {
        let result = self.runner.run(program, args, timeout).await;
        if let Err(ref e) = result {
            debug!(program, error = %e, "probe command produced no data");
        }
        result
    }

    // ── VPN classification inputs ───────────────────────────────────

    pub async fn process_names(&self) -> Result<Vec<String>, ProbeError> {
        let out = self.run("ps", &["-axo", "comm="]).await?;
        Ok(parse_process_names(&out))
    }

    pub async fn interfaces(&self) -> Result<Vec<InterfaceBlock>, ProbeError> {
        let out = self.run("ifconfig", &[]).await?;
        Ok(parse_interfaces(&out))
    }

    /// Mesh client's exit-node state. Absent tool, failure or timeout all
    /// read as `false`.
    pub async fn exit_node_active(&self) -> bool {
        match self
            .run(&self.tools.tailscale, &["status", "--json"])
            .await
        {
            Ok(json) => parse_exit_node_status(&json),
            Err(_) => false,
        }
    }

    // ── Gateway inputs ──────────────────────────────────────────────

    pub async fn service_router(&self, service: &str) -> Option<Ipv4Addr> {
        let out = self
            .run("networksetup", &["-getinfo", service])
            .await
            .ok()?;
        parse_router_field(&out)
    }

    pub async fn route_lookup(&self, destination: &str) -> Result<RouteLookup, ProbeError> {
        let out = self.run("route", &["-n", "get", destination]).await?;
        Ok(parse_route_get(&out))
    }

    pub async fn default_routes(&self) -> Vec<DefaultRoute> {
        self.run("netstat", &["-rn", "-f", "inet"])
            .await
            .map(|out| parse_netstat_defaults(&out))
            .unwrap_or_default()
    }

    // ── Misc ────────────────────────────────────────────────────────

    pub async fn resolver_config(&self) -> Result<Vec<ResolverBlock>, ProbeError> {
        let out = self.run("scutil", &["--dns"]).await?;
        Ok(parse_scutil_dns(&out))
    }

    pub async fn wifi_ssid(&self) -> Option<String> {
        let out = self
            .run("networksetup", &["-getairportnetwork", "en0"])
            .await
            .ok()?;
        parse_airport_ssid(&out)
    }

    /// One ICMP echo; round-trip in milliseconds.
    pub async fn ping(&self, ip: Ipv4Addr) -> Option<f64> {
        let target = ip.to_string();
        let out = self
            .run("ping", &["-c", "1", "-t", "2", &target])
            .await
            .ok()?;
        parse_ping_latency(&out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn probe(runner: &Arc<ScriptedRunner>) -> Probe {
        Probe::new(runner.clone(), Duration::from_secs(1), ToolPaths::default())
    }

    #[tokio::test]
    async fn exit_node_false_when_tool_missing() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.missing("tailscale status --json");
        assert!(!probe(&runner).exit_node_active().await);
    }

    #[tokio::test]
    async fn service_router_queries_networksetup() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("networksetup -getinfo Wi-Fi", "Router: 192.168.7.1\n");
        assert_eq!(
            probe(&runner).service_router("Wi-Fi").await,
            Some(Ipv4Addr::new(192, 168, 7, 1))
        );
        assert_eq!(probe(&runner).service_router("Ethernet").await, None);
    }

    #[tokio::test]
    async fn system_runner_reports_missing_binary() {
        let err = SystemRunner
            .run("vpnbypass-definitely-not-a-binary", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "got {err:?}");
    }
}
