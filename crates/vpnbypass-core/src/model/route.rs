// ── Routes and verification results ──

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use vpnbypass_helper::RouteSpec;

/// A bypass route the engine believes is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRoute {
    /// Host IP (`1.2.3.4`) or CIDR network (`91.108.4.0/22`).
    pub destination: String,
    pub gateway: Ipv4Addr,
    /// Domain name or service name that produced this route.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl ActiveRoute {
    pub fn host(ip: Ipv4Addr, gateway: Ipv4Addr, source: &str, now: DateTime<Utc>) -> Self {
        Self {
            destination: ip.to_string(),
            gateway,
            source: source.to_owned(),
            created_at: now,
        }
    }

    pub fn network(net: Ipv4Net, gateway: Ipv4Addr, source: &str, now: DateTime<Utc>) -> Self {
        Self {
            destination: net.to_string(),
            gateway,
            source: source.to_owned(),
            created_at: now,
        }
    }

    pub fn is_network(&self) -> bool {
        self.destination.contains('/')
    }

    /// The destination as a host address, `None` for network routes.
    pub fn host_ip(&self) -> Option<Ipv4Addr> {
        if self.is_network() {
            None
        } else {
            self.destination.parse().ok()
        }
    }

    /// An address inside the destination to probe when verifying.
    pub fn probe_target(&self) -> Option<Ipv4Addr> {
        if self.is_network() {
            let net: Ipv4Net = self.destination.parse().ok()?;
            net.hosts().next()
        } else {
            self.host_ip()
        }
    }

    pub fn to_spec(&self) -> RouteSpec {
        RouteSpec {
            destination: self.destination.clone(),
            gateway: self.gateway,
            is_network: self.is_network(),
        }
    }
}

/// Outcome of checking one active route. Rebuilt on every pass, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteVerificationResult {
    pub destination: String,
    /// The kernel routes the destination via the expected gateway.
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}
