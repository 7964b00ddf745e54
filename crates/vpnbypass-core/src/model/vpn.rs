// ── VPN connection state ──

use serde::{Deserialize, Serialize};
use strum::Display;

/// Kind of VPN behind a tunnel interface. Derived on every status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum VpnType {
    GlobalProtect,
    #[strum(to_string = "Cisco AnyConnect")]
    CiscoAnyConnect,
    OpenVPN,
    WireGuard,
    #[strum(to_string = "Tailscale exit node")]
    TailscaleExitNode,
    Fortinet,
    Zscaler,
    #[strum(to_string = "Cloudflare WARP")]
    CloudflareWARP,
    #[strum(to_string = "Palo Alto")]
    PaloAlto,
    #[strum(to_string = "Pulse Secure")]
    PulseSecure,
    Unknown,
}

impl VpnType {
    /// Best guess from the interface name alone.
    pub fn from_interface_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("gpd") {
            Self::GlobalProtect
        } else if name.starts_with("tun") || name.starts_with("tap") {
            Self::OpenVPN
        } else if name.starts_with("ipsec") {
            Self::CiscoAnyConnect
        } else {
            Self::Unknown
        }
    }
}

/// Result of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnStatus {
    pub connected: bool,
    pub interface: Option<String>,
    pub vpn_type: Option<VpnType>,
}

impl VpnStatus {
    pub fn connected(interface: &str, vpn_type: VpnType) -> Self {
        Self {
            connected: true,
            interface: Some(interface.to_owned()),
            vpn_type: Some(vpn_type),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(VpnType::CiscoAnyConnect.to_string(), "Cisco AnyConnect");
        assert_eq!(VpnType::OpenVPN.to_string(), "OpenVPN");
    }

    #[test]
    fn type_from_interface_name() {
        assert_eq!(VpnType::from_interface_name("gpd0"), VpnType::GlobalProtect);
        assert_eq!(VpnType::from_interface_name("tun0"), VpnType::OpenVPN);
        assert_eq!(VpnType::from_interface_name("utun4"), VpnType::Unknown);
    }
}
