// Direct executor: runs `route`, `cp` and the DNS flush commands itself
// through an elevation prefix. Used when the helper is not installed.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vpnbypass_helper::{BatchOutcome, Error as HelperError, HostsEntry, RouteExecutor, RouteSpec};

use crate::hosts::splice_hosts;
use crate::probe::{CommandRunner, ProbeError};

pub struct DirectExecutor {
    runner: Arc<dyn CommandRunner>,
    /// Prepended to every privileged command, e.g. `["sudo", "-n"]`.
    elevation: Vec<String>,
    hosts_path: PathBuf,
    /// Directory the new hosts file is staged in before being copied over.
    staging_dir: PathBuf,
    timeout: Duration,
}

impl DirectExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        elevation: Vec<String>,
        hosts_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            elevation,
            hosts_path: hosts_path.into(),
            staging_dir: std::env::temp_dir(),
            timeout,
        }
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    async fn elevated(&self, args: &[&str]) -> Result<String, HelperError> {
        let mut argv: Vec<&str> = self.elevation.iter().map(String::as_str).collect();
        argv.extend_from_slice(args);
        let Some((program, rest)) = argv.split_first() else {
            return Err(HelperError::UnsupportedOperation("empty command"));
        };
        debug!(command = %argv.join(" "), "direct exec");
        self.runner
            .run(program, rest, self.timeout)
            .await
            .map_err(|e| command_failed(&argv, &e))
    }
}

fn command_failed(argv: &[&str], err: &ProbeError) -> HelperError {
    let stderr = match err {
        ProbeError::Failed { stderr, .. } if !stderr.is_empty() => stderr.clone(),
        other => other.to_string(),
    };
    HelperError::CommandFailed {
        command: argv.join(" "),
        stderr,
    }
}

#[async_trait]
impl RouteExecutor for DirectExecutor {
    async fn add_route(&self, route: &RouteSpec) -> Result<(), HelperError> {
        let kind = if route.is_network { "-net" } else { "-host" };
        let gateway = route.gateway.to_string();
        self.elevated(&["route", "-n", "add", kind, &route.destination, &gateway])
            .await
            .map(|_| ())
    }

    async fn remove_route(&self, destination: &str) -> Result<(), HelperError> {
        self.elevated(&["route", "-n", "delete", destination])
            .await
            .map(|_| ())
    }

    async fn add_routes_batch(&self, routes: &[RouteSpec]) -> Result<BatchOutcome, HelperError> {
        let mut outcome = BatchOutcome::default();
        for route in routes {
            outcome.merge(single(self.add_route(route).await));
        }
        Ok(outcome)
    }

    async fn remove_routes_batch(&self, destinations: &[String]) -> Result<BatchOutcome, HelperError> {
        let mut outcome = BatchOutcome::default();
        for destination in destinations {
            outcome.merge(single(self.remove_route(destination).await));
        }
        Ok(outcome)
    }

    async fn update_hosts_file(&self, entries: &[HostsEntry]) -> Result<(), HelperError> {
        let existing = match tokio::fs::read_to_string(&self.hosts_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let updated = splice_hosts(&existing, entries);
        if updated == existing {
            return Ok(());
        }

        // created exclusively with a random name; removed on drop
        let mut staged = tempfile::Builder::new()
            .prefix("vpnbypass-hosts.")
            .tempfile_in(&self.staging_dir)?;
        staged.write_all(updated.as_bytes())?;
        staged.flush()?;

        let staging = staged.path().to_string_lossy().into_owned();
        let target = self.hosts_path.to_string_lossy();
        self.elevated(&["cp", &staging, &target]).await.map(|_| ())
    }

    async fn flush_dns_cache(&self) -> Result<(), HelperError> {
        self.elevated(&["dscacheutil", "-flushcache"]).await?;
        self.elevated(&["killall", "-HUP", "mDNSResponder"])
            .await
            .map(|_| ())
    }

    async fn version(&self) -> Result<String, HelperError> {
        Ok("direct".into())
    }
}

fn single(result: Result<(), HelperError>) -> BatchOutcome {
    match result {
        Ok(()) => BatchOutcome {
            success_count: 1,
            failure_count: 0,
            error: None,
        },
        Err(e) => BatchOutcome {
            success_count: 0,
            failure_count: 1,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::testing::ScriptedRunner;

    const GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    fn executor(runner: &Arc<ScriptedRunner>, hosts: PathBuf) -> DirectExecutor {
        DirectExecutor::new(
            runner.clone(),
            vec!["sudo".into(), "-n".into()],
            hosts,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn batch_runs_one_command_per_route() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("sudo -n route -n add -host 1.2.3.4 192.168.1.1", "add host 1.2.3.4\n");
        runner.ok(
            "sudo -n route -n add -net 91.108.4.0/22 192.168.1.1",
            "add net 91.108.4.0\n",
        );
        let exec = executor(&runner, PathBuf::from("/nonexistent/hosts"));

        let outcome = exec
            .add_routes_batch(&[
                RouteSpec::host(Ipv4Addr::new(1, 2, 3, 4), GW),
                RouteSpec::network("91.108.4.0/22", GW),
                RouteSpec::host(Ipv4Addr::new(5, 6, 7, 8), GW),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failure_count, 1);
        assert!(
            outcome
                .error
                .unwrap()
                .contains("sudo -n route -n add -host 5.6.7.8 192.168.1.1")
        );
    }

    #[tokio::test]
    async fn hosts_file_is_staged_privately_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        let exec = executor(&runner, hosts.clone()).with_staging_dir(&staging);

        // cp is unscripted and fails
        let err = exec
            .update_hosts_file(&[HostsEntry {
                domain: "example.com".into(),
                ip: Ipv4Addr::new(1, 2, 3, 4),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, HelperError::CommandFailed { .. }));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let staged_prefix = format!("sudo -n cp {}", staging.join("vpnbypass-hosts.").display());
        assert!(calls[0].starts_with(&staged_prefix), "{}", calls[0]);
        assert!(calls[0].ends_with(&format!(" {}", hosts.display())));

        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
        assert_eq!(std::fs::read_to_string(&hosts).unwrap(), "127.0.0.1 localhost\n");
    }

    #[tokio::test]
    async fn unchanged_hosts_file_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();

        let runner = Arc::new(ScriptedRunner::new());
        executor(&runner, hosts).update_hosts_file(&[]).await.unwrap();
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn flush_runs_both_commands() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("sudo -n dscacheutil -flushcache", "");
        runner.ok("sudo -n killall -HUP mDNSResponder", "");
        executor(&runner, PathBuf::from("/etc/hosts"))
            .flush_dns_cache()
            .await
            .unwrap();
        assert_eq!(runner.count("sudo -n"), 2);
    }
}
