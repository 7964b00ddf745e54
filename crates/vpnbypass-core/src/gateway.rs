// ── Gateway resolver ──
//
// Finds the regular (non-VPN) default gateway that bypass routes point at.
// Network-service router fields are asked first because they stay correct
// while a VPN owns the default route; the routing table is the fallback.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::classifier::is_tunnel_interface;
use crate::probe::Probe;

/// Network services queried for a `Router:` field, in order.
pub const NETWORK_SERVICES: &[&str] = &[
    "Wi-Fi",
    "Ethernet",
    "USB 10/100/1000 LAN",
    "Thunderbolt Ethernet",
    "Thunderbolt Bridge",
];

#[derive(Debug, Clone)]
pub struct GatewayResolver {
    probe: Probe,
}

impl GatewayResolver {
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }

    /// The local gateway, skipping anything that lives on
    /// `vpn_interface` or another tunnel.
    pub async fn resolve(&self, vpn_interface: Option<&str>) -> Option<Ipv4Addr> {
        for service in NETWORK_SERVICES {
            if let Some(router) = self.probe.service_router(service).await {
                debug!(service, %router, "gateway from network service");
                return Some(router);
            }
        }

        let on_tunnel = |iface: &str| is_tunnel_interface(iface) || Some(iface) == vpn_interface;

        if let Ok(lookup) = self.probe.route_lookup("default").await {
            if let (Some(gateway), Some(iface)) = (lookup.gateway, lookup.interface.as_deref()) {
                if !on_tunnel(iface) {
                    debug!(%gateway, interface = iface, "gateway from default route");
                    return Some(gateway);
                }
            }
        }

        // with a VPN up, the scoped per-interface defaults are still listed
        let gateway = self
            .probe
            .default_routes()
            .await
            .into_iter()
            .find(|route| !on_tunnel(&route.interface))
            .map(|route| route.gateway);
        match gateway {
            Some(gw) => debug!(gateway = %gw, "gateway from routing table"),
            None => debug!("no local gateway found"),
        }
        gateway
    }
}
