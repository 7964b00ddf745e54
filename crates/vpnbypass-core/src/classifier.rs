// ── VPN classifier ──
//
// Decides whether a VPN is up, on which interface, and what kind it is,
// from the process list and the interface listing. Heuristic by nature:
// a tunnel-named interface that is UP and carries a VPN-like IPv4
// address counts; the process list only refines the type.

use std::net::Ipv4Addr;

use tracing::{debug, warn};

use crate::model::{VpnStatus, VpnType};
use crate::probe::Probe;

/// Interface name prefixes used by tunnel drivers.
pub const TUNNEL_PREFIXES: &[&str] = &["utun", "tun", "tap", "ppp", "ipsec", "gpd", "feth", "zt"];

/// Known VPN client process signatures, matched as lowercase substrings.
/// Tailscale is deliberately absent: it runs permanently and only counts
/// when an exit node is active.
const PROCESS_SIGNATURES: &[(&str, VpnType)] = &[
    ("globalprotect", VpnType::GlobalProtect),
    ("pangp", VpnType::PaloAlto),
    ("anyconnect", VpnType::CiscoAnyConnect),
    ("vpnagentd", VpnType::CiscoAnyConnect),
    ("openvpn", VpnType::OpenVPN),
    ("wireguard", VpnType::WireGuard),
    ("wg-go", VpnType::WireGuard),
    ("forticlient", VpnType::Fortinet),
    ("fortitray", VpnType::Fortinet),
    ("zscaler", VpnType::Zscaler),
    ("warp-cli", VpnType::CloudflareWARP),
    ("warp-svc", VpnType::CloudflareWARP),
    ("pulsesecure", VpnType::PulseSecure),
    ("pulse secure", VpnType::PulseSecure),
];

pub fn is_tunnel_interface(name: &str) -> bool {
    TUNNEL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// First process (in listing order) matching a known client signature.
pub fn hint_from_processes(names: &[String]) -> Option<VpnType> {
    names.iter().find_map(|name| {
        let name = name.to_lowercase();
        PROCESS_SIGNATURES
            .iter()
            .find(|(sig, _)| name.contains(sig))
            .map(|(_, vpn_type)| *vpn_type)
    })
}

// ── Address classification ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    /// Loopback, link-local, or public.
    NotVpn,
    /// RFC 1918 private space.
    Private,
    /// 100.96.0.0/12, the slice of CGNAT space WARP assigns from.
    Warp,
    /// Rest of 100.64.0.0/10: mesh overlays. Only a VPN when the mesh
    /// routes everything through an exit node.
    MeshOverlay,
}

pub fn classify_address(ip: Ipv4Addr) -> AddressClass {
    let [a, b, _, _] = ip.octets();
    match (a, b) {
        (127, _) | (169, 254) => AddressClass::NotVpn,
        (100, 96..=111) => AddressClass::Warp,
        (100, 64..=95) => AddressClass::MeshOverlay,
        (10, _) | (172, 16..=31) | (192, 168) => AddressClass::Private,
        _ => AddressClass::NotVpn,
    }
}

/// Lazily asks the mesh client about exit nodes, at most once per
/// classification pass.
#[derive(Debug)]
pub struct ExitNodeCheck<'a> {
    probe: &'a Probe,
    cached: Option<bool>,
}

impl<'a> ExitNodeCheck<'a> {
    pub fn new(probe: &'a Probe) -> Self {
        Self {
            probe,
            cached: None,
        }
    }

    pub async fn confirmed(&mut self) -> bool {
        if let Some(active) = self.cached {
            return active;
        }
        let active = self.probe.exit_node_active().await;
        debug!(active, "exit node status");
        self.cached = Some(active);
        active
    }
}

pub async fn is_vpn_like_ip(ip: Ipv4Addr, exit_node: &mut ExitNodeCheck<'_>) -> bool {
    match classify_address(ip) {
        AddressClass::NotVpn => false,
        AddressClass::Private | AddressClass::Warp => true,
        AddressClass::MeshOverlay => exit_node.confirmed().await,
    }
}

// ── Classifier ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VpnClassifier {
    probe: Probe,
}

impl VpnClassifier {
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }

    /// Classify the current system state. Probe failures return `prior`
    /// unchanged.
    pub async fn classify(&self, prior: &VpnStatus) -> VpnStatus {
        let (processes, interfaces) =
            tokio::join!(self.probe.process_names(), self.probe.interfaces());

        let interfaces = match interfaces {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(error = %e, "interface probe failed, keeping prior VPN state");
                return prior.clone();
            }
        };
        let processes = match processes {
            Ok(processes) => processes,
            Err(e) => {
                warn!(error = %e, "process probe failed, keeping prior VPN state");
                return prior.clone();
            }
        };

        let hint = hint_from_processes(&processes);
        let mut exit_node = ExitNodeCheck::new(&self.probe);

        for block in &interfaces {
            if !block.up || !is_tunnel_interface(&block.name) {
                continue;
            }
            for &ip in &block.ipv4 {
                if !is_vpn_like_ip(ip, &mut exit_node).await {
                    continue;
                }
                let vpn_type = hint.unwrap_or_else(|| match classify_address(ip) {
                    AddressClass::MeshOverlay => VpnType::TailscaleExitNode,
                    AddressClass::Warp => VpnType::CloudflareWARP,
                    _ => VpnType::from_interface_name(&block.name),
                });
                debug!(interface = %block.name, %ip, %vpn_type, "VPN interface qualified");
                return VpnStatus::connected(&block.name, vpn_type);
            }
        }

        VpnStatus::disconnected()
    }
}
