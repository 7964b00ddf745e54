// Test doubles for the engine's external seams.

#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use vpnbypass_helper::{BatchOutcome, Error as HelperError, HostsEntry, RouteExecutor, RouteSpec};

use crate::dns::SystemLookup;
use crate::probe::{CommandRunner, ProbeError};

// ── Command runner ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Reply {
    Ok(String),
    Fail,
    Timeout,
    Missing,
}

/// Answers commands from a script keyed by `"program arg1 arg2"`.
/// Unscripted commands fail with a non-zero exit.
#[derive(Debug, Default)]
pub(crate) struct ScriptedRunner {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn set(&self, command: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(command.to_owned(), reply);
    }

    pub(crate) fn ok(&self, command: &str, output: &str) {
        self.set(command, Reply::Ok(output.to_owned()));
    }

    pub(crate) fn fail(&self, command: &str) {
        self.set(command, Reply::Fail);
    }

    pub(crate) fn timeout(&self, command: &str) {
        self.set(command, Reply::Timeout);
    }

    pub(crate) fn missing(&self, command: &str) {
        self.set(command, Reply::Missing);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, ProbeError> {
        let key = if args.is_empty() {
            program.to_owned()
        } else {
            format!("{program} {}", args.join(" "))
        };
        self.calls.lock().unwrap().push(key.clone());
        let reply = self.replies.lock().unwrap().get(&key).cloned();

        match reply {
            Some(Reply::Ok(out)) => Ok(out),
            Some(Reply::Timeout) => Err(ProbeError::Timeout {
                program: program.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap(),
            }),
            Some(Reply::Missing) => Err(ProbeError::NotFound {
                program: program.to_owned(),
            }),
            Some(Reply::Fail) | None => Err(ProbeError::Failed {
                program: program.to_owned(),
                status: "exit status: 1".into(),
                stderr: format!("unscripted: {key}"),
            }),
        }
    }
}

// ── System resolver ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct FakeLookup {
    answers: Mutex<HashMap<String, Vec<Ipv4Addr>>>,
}

impl FakeLookup {
    pub(crate) fn set(&self, domain: &str, ips: &[Ipv4Addr]) {
        self.answers
            .lock()
            .unwrap()
            .insert(domain.to_owned(), ips.to_vec());
    }

    pub(crate) fn clear(&self, domain: &str) {
        self.answers.lock().unwrap().remove(domain);
    }
}

#[async_trait]
impl SystemLookup for FakeLookup {
    async fn lookup_ipv4(&self, domain: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        self.answers
            .lock()
            .unwrap()
            .get(domain)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "NXDOMAIN"))
    }
}

// ── Route executor ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecCall {
    Add(String),
    Remove(String),
    AddBatch(Vec<String>),
    RemoveBatch(Vec<String>),
    Hosts(Vec<HostsEntry>),
    Flush,
}

/// Records what it was asked to do and keeps a model of the routing
/// table. Accepts everything unless told otherwise.
#[derive(Debug, Default)]
pub(crate) struct RecordingExecutor {
    calls: Mutex<Vec<ExecCall>>,
    unavailable: AtomicBool,
    /// Fail adds of destinations already installed, like `route add`.
    kernel_strict: AtomicBool,
    installed: Mutex<HashSet<String>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingExecutor {
    pub(crate) fn unavailable() -> Self {
        let exec = Self::default();
        exec.unavailable.store(true, Ordering::SeqCst);
        exec
    }

    pub(crate) fn reject_existing(&self) {
        self.kernel_strict.store(true, Ordering::SeqCst);
    }

    /// Fail every add or remove of `destination` from now on.
    pub(crate) fn reject(&self, destination: &str) {
        self.rejected.lock().unwrap().insert(destination.to_owned());
    }

    pub(crate) fn accept_all(&self) {
        self.rejected.lock().unwrap().clear();
    }

    /// Destinations the fake routing table holds.
    pub(crate) fn installed(&self) -> HashSet<String> {
        self.installed.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn add_batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ExecCall::AddBatch(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn remove_batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ExecCall::RemoveBatch(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn hosts_updates(&self) -> Vec<Vec<HostsEntry>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ExecCall::Hosts(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn reachable(&self) -> Result<(), HelperError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HelperError::Unavailable {
                path: "/tmp/fake.sock".into(),
                reason: "No such file or directory".into(),
            });
        }
        Ok(())
    }

    fn record(&self, call: ExecCall) -> Result<(), HelperError> {
        self.reachable()?;
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn apply_add(&self, destination: &str) -> Result<(), String> {
        if self.rejected.lock().unwrap().contains(destination) {
            return Err(format!("add {destination}: rejected"));
        }
        let mut installed = self.installed.lock().unwrap();
        if !installed.insert(destination.to_owned()) && self.kernel_strict.load(Ordering::SeqCst) {
            return Err(format!("add {destination}: File exists"));
        }
        Ok(())
    }

    fn apply_remove(&self, destination: &str) -> Result<(), String> {
        if self.rejected.lock().unwrap().contains(destination) {
            return Err(format!("delete {destination}: rejected"));
        }
        self.installed.lock().unwrap().remove(destination);
        Ok(())
    }
}

fn tally<'a>(
    items: impl Iterator<Item = &'a str>,
    mut apply: impl FnMut(&str) -> Result<(), String>,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for item in items {
        let single = match apply(item) {
            Ok(()) => BatchOutcome {
                success_count: 1,
                failure_count: 0,
                error: None,
            },
            Err(e) => BatchOutcome {
                success_count: 0,
                failure_count: 1,
                error: Some(e),
            },
        };
        outcome.merge(single);
    }
    outcome
}

#[async_trait]
impl RouteExecutor for RecordingExecutor {
    async fn add_route(&self, route: &RouteSpec) -> Result<(), HelperError> {
        self.record(ExecCall::Add(route.destination.clone()))?;
        self.apply_add(&route.destination)
            .map_err(|message| HelperError::Rejected { message })
    }

    async fn remove_route(&self, destination: &str) -> Result<(), HelperError> {
        self.record(ExecCall::Remove(destination.to_owned()))?;
        self.apply_remove(destination)
            .map_err(|message| HelperError::Rejected { message })
    }

    async fn add_routes_batch(&self, routes: &[RouteSpec]) -> Result<BatchOutcome, HelperError> {
        self.record(ExecCall::AddBatch(
            routes.iter().map(|r| r.destination.clone()).collect(),
        ))?;
        Ok(tally(routes.iter().map(|r| r.destination.as_str()), |d| {
            self.apply_add(d)
        }))
    }

    async fn remove_routes_batch(&self, destinations: &[String]) -> Result<BatchOutcome, HelperError> {
        self.record(ExecCall::RemoveBatch(destinations.to_vec()))?;
        Ok(tally(destinations.iter().map(String::as_str), |d| {
            self.apply_remove(d)
        }))
    }

    async fn update_hosts_file(&self, entries: &[HostsEntry]) -> Result<(), HelperError> {
        self.record(ExecCall::Hosts(entries.to_vec()))
    }

    async fn flush_dns_cache(&self) -> Result<(), HelperError> {
        self.record(ExecCall::Flush)
    }

    async fn version(&self) -> Result<String, HelperError> {
        self.reachable().map(|()| "test".into())
    }
}
