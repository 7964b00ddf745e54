// ── DNS resolution pipeline ──
//
// Resolves a domain to IPv4 addresses through an ordered chain of tiers,
// stopping at the first tier that yields at least one address:
//
//   1. the pre-VPN DNS server detected at startup (plain, one retry)
//   2. each configured fallback upstream in order (plain / DoH / DoT)
//   3. the operating system's resolver
//   4. the on-disk cache of earlier resolutions
//
// Tier failures are logged at debug and never escape; a domain for which
// every tier comes up empty resolves to `None`.

mod cache;
mod doh;
mod upstream;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info, warn};

pub use cache::DiskDnsCache;
pub use doh::query_doh;
pub use upstream::Upstream;

use crate::classifier::is_tunnel_interface;
use crate::config::DnsTimeouts;
use crate::probe::{Probe, ResolverBlock, parse_ipv4_tokens};

/// Which tier produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    PreVpn,
    Fallback,
    System,
    DiskCache,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ips: Vec<Ipv4Addr>,
    pub tier: Tier,
}

/// The operating system's resolver.
#[async_trait]
pub trait SystemLookup: Send + Sync {
    async fn lookup_ipv4(&self, domain: &str) -> std::io::Result<Vec<Ipv4Addr>>;
}

/// `getaddrinfo` via `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLookup;

#[async_trait]
impl SystemLookup for TokioLookup {
    async fn lookup_ipv4(&self, domain: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        let mut ips = Vec::new();
        for addr in tokio::net::lookup_host((domain, 0)).await? {
            if let IpAddr::V4(ip) = addr.ip() {
                if !ips.contains(&ip) {
                    ips.push(ip);
                }
            }
        }
        Ok(ips)
    }
}

/// Pick the tier-1 server from a resolver configuration dump: the first
/// IPv4 nameserver of a default resolver that is not bound to a tunnel
/// interface. Split-DNS resolvers (`domain : …`) are ignored.
pub fn pick_pre_vpn_server(blocks: &[ResolverBlock]) -> Option<IpAddr> {
    blocks
        .iter()
        .filter(|b| b.domain.is_none())
        .filter(|b| !b.interface.as_deref().is_some_and(is_tunnel_interface))
        .flat_map(|b| b.nameservers.iter())
        .find(|ns| matches!(ns, IpAddr::V4(v4) if !v4.is_loopback()))
        .copied()
}

pub struct DnsResolver {
    probe: Probe,
    http: reqwest::Client,
    system: Arc<dyn SystemLookup>,
    pre_vpn: RwLock<Option<IpAddr>>,
    upstreams: RwLock<Vec<Upstream>>,
    disk: Arc<DiskDnsCache>,
    timeouts: DnsTimeouts,
    concurrency: usize,
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("pre_vpn", &self.pre_vpn_server())
            .field("upstreams", &self.upstreams())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl DnsResolver {
    pub fn new(
        probe: Probe,
        system: Arc<dyn SystemLookup>,
        disk: Arc<DiskDnsCache>,
        timeouts: DnsTimeouts,
        concurrency: usize,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vpnbypass/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            probe,
            http,
            system,
            pre_vpn: RwLock::new(None),
            upstreams: RwLock::new(Vec::new()),
            disk,
            timeouts,
            concurrency: concurrency.max(1),
        }
    }

    pub fn disk_cache(&self) -> &Arc<DiskDnsCache> {
        &self.disk
    }

    pub fn pre_vpn_server(&self) -> Option<IpAddr> {
        *self.pre_vpn.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_pre_vpn_server(&self, server: Option<IpAddr>) {
        *self.pre_vpn.write().unwrap_or_else(PoisonError::into_inner) = server;
    }

    pub fn upstreams(&self) -> Vec<Upstream> {
        self.upstreams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the fallback chain. Unparseable entries are skipped.
    pub fn set_fallbacks(&self, entries: &[String]) {
        let parsed: Vec<Upstream> = entries
            .iter()
            .filter_map(|raw| match raw.parse::<Upstream>() {
                Ok(up) => Some(up),
                Err(e) => {
                    warn!(entry = %raw, error = %e, "ignoring fallback DNS entry");
                    None
                }
            })
            .collect();
        *self
            .upstreams
            .write()
            .unwrap_or_else(PoisonError::into_inner) = parsed;
    }

    /// Inspect the resolver configuration and remember the first usable
    /// non-tunnel server as tier 1.
    pub async fn detect_pre_vpn_server(&self) -> Option<IpAddr> {
        let server = match self.probe.resolver_config().await {
            Ok(blocks) => pick_pre_vpn_server(&blocks),
            Err(e) => {
                warn!(error = %e, "cannot read resolver configuration");
                None
            }
        };
        match server {
            Some(ip) => info!(server = %ip, "detected pre-VPN DNS server"),
            None => debug!("no pre-VPN DNS server detected"),
        }
        self.set_pre_vpn_server(server);
        server
    }

    // ── Resolution ──────────────────────────────────────────────────

    /// Walk the tier chain for one domain.
    pub async fn resolve(&self, domain: &str) -> Option<Resolution> {
        if let Some(server) = self.pre_vpn_server() {
            let attempts = self.timeouts.primary_retries + 1;
            for attempt in 1..=attempts {
                match self.query_plain(server, domain, self.timeouts.primary).await {
                    Some(ips) if !ips.is_empty() => {
                        return Some(self.accept(domain, ips, Tier::PreVpn));
                    }
                    // an empty answer is definitive, don't retry it
                    Some(_) => break,
                    None => debug!(domain, attempt, "pre-VPN DNS query failed"),
                }
            }
        }

        for upstream in self.upstreams() {
            let ips = match &upstream {
                Upstream::Plain(server) => self.query_plain(*server, domain, self.timeouts.plain).await,
                Upstream::Doh(url) => {
                    match query_doh(&self.http, url, domain, self.timeouts.doh).await {
                        Ok(ips) => Some(ips),
                        Err(e) => {
                            debug!(domain, upstream = %url, error = %e, "DoH query failed");
                            None
                        }
                    }
                }
                Upstream::Dot { host, port } => self.query_dot(host, *port, domain).await,
            };
            if let Some(ips) = ips.filter(|ips| !ips.is_empty()) {
                debug!(domain, upstream = %upstream, kind = upstream.kind(), "fallback answered");
                return Some(self.accept(domain, ips, Tier::Fallback));
            }
        }

        match tokio::time::timeout(self.timeouts.system, self.system.lookup_ipv4(domain)).await {
            Ok(Ok(ips)) if !ips.is_empty() => {
                return Some(self.accept(domain, ips, Tier::System));
            }
            Ok(Ok(_)) => debug!(domain, "system resolver returned no IPv4"),
            Ok(Err(e)) => debug!(domain, error = %e, "system resolver failed"),
            Err(_) => debug!(domain, "system resolver timed out"),
        }

        if let Some(ip) = self.disk.get(domain) {
            return Some(self.accept(domain, vec![ip], Tier::DiskCache));
        }

        warn!(domain, "all resolution tiers failed");
        None
    }

    /// Resolve many domains with bounded parallelism. Results come back
    /// in input order once every resolution has finished.
    pub async fn resolve_many(&self, domains: &[String]) -> IndexMap<String, Option<Resolution>> {
        let mut finished: IndexMap<String, Option<Resolution>> = stream::iter(domains.iter().cloned())
            .map(|domain| async move {
                let result = self.resolve(&domain).await;
                (domain, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        domains
            .iter()
            .filter_map(|d| finished.swap_remove_entry(d))
            .collect()
    }

    fn accept(&self, domain: &str, ips: Vec<Ipv4Addr>, tier: Tier) -> Resolution {
        debug!(domain, %tier, count = ips.len(), first = ?ips.first(), "resolved");
        Resolution { ips, tier }
    }

    /// `dig +short @server domain A`. `None` when the query itself failed.
    async fn query_plain(&self, server: IpAddr, domain: &str, timeout: Duration) -> Option<Vec<Ipv4Addr>> {
        let at = format!("@{server}");
        let time = format!("+time={}", timeout.as_secs_f64().ceil().max(1.0));
        let out = self
            .probe
            .run_with_timeout(
                &self.probe.tools().dig,
                &["+short", &time, "+tries=1", &at, domain, "A"],
                timeout + Duration::from_millis(500),
            )
            .await
            .ok()?;
        Some(parse_ipv4_tokens(&out))
    }

    /// `kdig +short +tls @host -p port domain A`. A missing tool skips
    /// the tier silently.
    async fn query_dot(&self, host: &str, port: u16, domain: &str) -> Option<Vec<Ipv4Addr>> {
        let at = format!("@{host}");
        let port = port.to_string();
        match self
            .probe
            .run_with_timeout(
                &self.probe.tools().kdig,
                &["+short", "+tls", &at, "-p", &port, domain, "A"],
                self.timeouts.dot,
            )
            .await
        {
            Ok(out) => Some(parse_ipv4_tokens(&out)),
            Err(e) if e.is_not_found() => {
                debug!(domain, "DoT tool not installed, skipping tier");
                None
            }
            Err(_) => None,
        }
    }
}
