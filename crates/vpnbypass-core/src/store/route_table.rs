// ── Active route table ──
//
// The engine's record of which bypass routes are installed. Keyed by
// destination, so at most one route per destination can exist; insertion
// order is kept so snapshots list routes the way they were planned.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::model::ActiveRoute;

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    by_destination: IndexMap<String, ActiveRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route. Returns `false`, leaving the table untouched, when
    /// the destination is already owned by some source.
    pub fn insert(&mut self, route: ActiveRoute) -> bool {
        if self.by_destination.contains_key(&route.destination) {
            return false;
        }
        self.by_destination.insert(route.destination.clone(), route);
        true
    }

    pub fn remove(&mut self, destination: &str) -> Option<ActiveRoute> {
        self.by_destination.shift_remove(destination)
    }

    /// Remove every route tagged with `source`.
    pub fn remove_source(&mut self, source: &str) -> Vec<ActiveRoute> {
        let destinations: Vec<String> = self
            .by_destination
            .values()
            .filter(|r| r.source == source)
            .map(|r| r.destination.clone())
            .collect();
        destinations
            .iter()
            .filter_map(|d| self.by_destination.shift_remove(d))
            .collect()
    }

    /// Replace the whole table, first route per destination wins.
    pub fn replace_all(&mut self, routes: impl IntoIterator<Item = ActiveRoute>) {
        self.by_destination.clear();
        for route in routes {
            self.insert(route);
        }
    }

    pub fn clear(&mut self) -> Vec<ActiveRoute> {
        self.by_destination.drain(..).map(|(_, r)| r).collect()
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.by_destination.contains_key(destination)
    }

    pub fn get(&self, destination: &str) -> Option<&ActiveRoute> {
        self.by_destination.get(destination)
    }

    /// Host-route IPs currently owned by `source`. Network routes are not
    /// included.
    pub fn host_ips_for(&self, source: &str) -> BTreeSet<Ipv4Addr> {
        self.by_destination
            .values()
            .filter(|r| r.source == source)
            .filter_map(ActiveRoute::host_ip)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActiveRoute> {
        self.by_destination.values()
    }

    pub fn destinations(&self) -> Vec<String> {
        self.by_destination.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_destination.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_destination.is_empty()
    }

    /// Immutable copy for publishing.
    pub fn snapshot(&self) -> Arc<Vec<ActiveRoute>> {
        Arc::new(self.by_destination.values().cloned().collect())
    }
}
