// ── Route planner and differ ──
//
// Pure functions from (sources, resolutions, active table) to the route
// set the engine should install or the delta it should submit. The only
// async piece is handing the domain list to the DNS pipeline.

use std::collections::{BTreeSet, HashSet};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ipnet::Ipv4Net;

use crate::dns::{DnsResolver, Resolution};
use crate::model::{ActiveRoute, DomainEntry, ServiceEntry, Settings};
use crate::store::RouteTable;

/// Resolution results keyed by domain, in request order.
pub type Resolutions = IndexMap<String, Option<Resolution>>;

/// Something that produces routes under one `source` label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub domains: Vec<String>,
    pub networks: Vec<Ipv4Net>,
}

impl Source {
    pub fn from_domain(entry: &DomainEntry) -> Self {
        Self {
            name: entry.domain.clone(),
            domains: vec![entry.domain.clone()],
            networks: Vec::new(),
        }
    }

    pub fn from_service(entry: &ServiceEntry) -> Self {
        Self {
            name: entry.name.clone(),
            domains: entry.domains.clone(),
            networks: entry.networks(),
        }
    }
}

/// Enabled domains first, then enabled services, each in configuration
/// order. This order decides which source keeps a shared destination.
pub fn sources_for(settings: &Settings) -> Vec<Source> {
    settings
        .enabled_domains()
        .map(Source::from_domain)
        .chain(settings.enabled_services().map(Source::from_service))
        .collect()
}

/// Every domain across `sources`, once, in first-seen order.
pub fn unique_domains(sources: &[Source]) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .flat_map(|s| s.domains.iter())
        .filter(|d| seen.insert(d.as_str()))
        .cloned()
        .collect()
}

pub async fn resolve_sources(resolver: &DnsResolver, sources: &[Source]) -> Resolutions {
    resolver.resolve_many(&unique_domains(sources)).await
}

/// Domain → first resolved address, for the hosts block and the caches.
pub fn first_ips(resolutions: &Resolutions) -> IndexMap<String, Ipv4Addr> {
    resolutions
        .iter()
        .filter_map(|(domain, res)| {
            let ip = res.as_ref()?.ips.first()?;
            Some((domain.clone(), *ip))
        })
        .collect()
}

fn failed(resolutions: &Resolutions, domain: &str) -> bool {
    !matches!(resolutions.get(domain), Some(Some(res)) if !res.ips.is_empty())
}

fn ips_of<'a>(resolutions: &'a Resolutions, domain: &str) -> &'a [Ipv4Addr] {
    match resolutions.get(domain) {
        Some(Some(res)) => &res.ips,
        _ => &[],
    }
}

/// Desired route set for a full apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub routes: Vec<ActiveRoute>,
    /// Domains no tier could resolve, once each, in order.
    pub failed_domains: Vec<String>,
}

/// Build the full route set. A destination claimed by more than one
/// source goes to the first.
pub fn build_plan(
    sources: &[Source],
    resolutions: &Resolutions,
    gateway: Ipv4Addr,
    now: DateTime<Utc>,
) -> Plan {
    let mut routes: IndexMap<String, ActiveRoute> = IndexMap::new();
    let mut failed_domains: Vec<String> = Vec::new();

    for source in sources {
        for domain in &source.domains {
            if failed(resolutions, domain) {
                if !failed_domains.contains(domain) {
                    failed_domains.push(domain.clone());
                }
                continue;
            }
            for ip in ips_of(resolutions, domain) {
                let route = ActiveRoute::host(*ip, gateway, &source.name, now);
                routes.entry(route.destination.clone()).or_insert(route);
            }
        }
        for net in &source.networks {
            let route = ActiveRoute::network(*net, gateway, &source.name, now);
            routes.entry(route.destination.clone()).or_insert(route);
        }
    }

    Plan {
        routes: routes.into_values().collect(),
        failed_domains,
    }
}

/// Routes for one newly enabled source that are not already active.
pub fn build_additions(
    source: &Source,
    resolutions: &Resolutions,
    table: &RouteTable,
    gateway: Ipv4Addr,
    now: DateTime<Utc>,
) -> Plan {
    let mut plan = build_plan(std::slice::from_ref(source), resolutions, gateway, now);
    plan.routes.retain(|r| !table.contains(&r.destination));
    plan
}

/// What a refresh pass should change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshDelta {
    pub add: Vec<ActiveRoute>,
    /// Destinations to take down.
    pub remove: Vec<String>,
    pub failed_domains: Vec<String>,
}

impl RefreshDelta {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Per-source symmetric difference between the host routes in `table` and
/// the fresh resolutions.
///
/// Network routes are left alone. Addresses of domains that resolved are
/// always added. A source with any unresolvable domain keeps all of its
/// routes this round, since a route does not record which of the source's
/// domains produced it.
pub fn build_refresh_delta(
    sources: &[Source],
    resolutions: &Resolutions,
    table: &RouteTable,
    gateway: Ipv4Addr,
    now: DateTime<Utc>,
) -> RefreshDelta {
    let mut delta = RefreshDelta::default();
    let mut fresh_by_source: Vec<(&Source, BTreeSet<Ipv4Addr>)> = Vec::new();

    for source in sources {
        let mut partial = false;
        for domain in source.domains.iter().filter(|d| failed(resolutions, d)) {
            partial = true;
            if !delta.failed_domains.contains(domain) {
                delta.failed_domains.push(domain.clone());
            }
        }

        let fresh: BTreeSet<Ipv4Addr> = source
            .domains
            .iter()
            .flat_map(|d| ips_of(resolutions, d).iter().copied())
            .collect();
        if !partial {
            let prior = table.host_ips_for(&source.name);
            delta
                .remove
                .extend(prior.difference(&fresh).map(ToString::to_string));
        }
        fresh_by_source.push((source, fresh));
    }

    // additions run after all removals are known so an address moving
    // between sources is not blocked by its old owner
    let removed: HashSet<&str> = delta.remove.iter().map(String::as_str).collect();
    let mut taken: HashSet<String> = table
        .destinations()
        .into_iter()
        .filter(|d| !removed.contains(d.as_str()))
        .collect();

    for (source, fresh) in fresh_by_source {
        for ip in fresh {
            let route = ActiveRoute::host(ip, gateway, &source.name, now);
            if taken.insert(route.destination.clone()) {
                delta.add.push(route);
            }
        }
    }
    delta
}
