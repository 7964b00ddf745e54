// ── Diagnostic output parsers ──
//
// Small, pure parsers over the text printed by system tools. Each one
// accepts the grammar it documents and ignores everything else; garbage
// in yields "no data", never a panic.

use std::net::{IpAddr, Ipv4Addr};

use serde_json::Value;

// ── ifconfig ────────────────────────────────────────────────────────

/// One interface block of `ifconfig` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBlock {
    pub name: String,
    /// `UP` present in the flags segment.
    pub up: bool,
    pub ipv4: Vec<Ipv4Addr>,
}

/// Split `ifconfig` output into interface blocks.
///
/// A block starts at an unindented line containing a colon
/// (`utun3: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1400`);
/// indented `inet <addr>` lines that follow belong to it.
pub fn parse_interfaces(text: &str) -> Vec<InterfaceBlock> {
    let mut blocks: Vec<InterfaceBlock> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indented = line.starts_with([' ', '\t']);
        if !indented {
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            let flags = rest
                .split_once('<')
                .and_then(|(_, tail)| tail.split_once('>'))
                .map_or("", |(flags, _)| flags);
            blocks.push(InterfaceBlock {
                name: name.trim().to_owned(),
                up: flags.split(',').any(|f| f.trim() == "UP"),
                ipv4: Vec::new(),
            });
            continue;
        }

        let Some(block) = blocks.last_mut() else {
            continue;
        };
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("inet") {
            continue;
        }
        let Some(raw) = tokens.next() else {
            continue;
        };
        // net-tools on Linux prints `inet addr:10.0.0.2`
        let raw = raw.strip_prefix("addr:").unwrap_or(raw);
        if let Ok(ip) = raw.parse::<Ipv4Addr>() {
            block.ipv4.push(ip);
        }
    }

    blocks
}

// ── ps ──────────────────────────────────────────────────────────────

/// One command name per line (`ps -axo comm=`), lowercased.
pub fn parse_process_names(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// ── tailscale status --json ─────────────────────────────────────────

/// Whether the mesh client reports an active exit node: either
/// `ExitNodeStatus.Online` or any peer flagged `ExitNode`.
pub fn parse_exit_node_status(json: &str) -> bool {
    let Ok(status) = serde_json::from_str::<Value>(json) else {
        return false;
    };
    if status
        .get("BackendState")
        .and_then(Value::as_str)
        .is_some_and(|s| s != "Running")
    {
        return false;
    }
    if status
        .pointer("/ExitNodeStatus/Online")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return true;
    }
    status
        .get("Peer")
        .and_then(Value::as_object)
        .is_some_and(|peers| {
            peers
                .values()
                .any(|p| p.get("ExitNode").and_then(Value::as_bool).unwrap_or(false))
        })
}

// ── networksetup -getinfo ───────────────────────────────────────────

/// The `Router:` field, unless empty or `none`.
pub fn parse_router_field(text: &str) -> Option<Ipv4Addr> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "Router" {
            return None;
        }
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            return None;
        }
        value.parse().ok()
    })
}

// ── route -n get ────────────────────────────────────────────────────

/// The interesting fields of `route -n get <dest>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteLookup {
    pub gateway: Option<Ipv4Addr>,
    pub interface: Option<String>,
}

pub fn parse_route_get(text: &str) -> RouteLookup {
    let mut lookup = RouteLookup::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "gateway" => lookup.gateway = value.trim().parse().ok(),
            "interface" => {
                let value = value.trim();
                if !value.is_empty() {
                    lookup.interface = Some(value.to_owned());
                }
            }
            _ => {}
        }
    }
    lookup
}

// ── netstat -rn -f inet ─────────────────────────────────────────────

/// A `default` row of the IPv4 routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoute {
    pub gateway: Ipv4Addr,
    pub interface: String,
}

/// `default` rows whose gateway is an IPv4 address
/// (`default 192.168.1.1 UGScg en0`). `link#N` gateways are skipped.
pub fn parse_netstat_defaults(text: &str) -> Vec<DefaultRoute> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            if tokens.next()? != "default" {
                return None;
            }
            let gateway = tokens.next()?.parse().ok()?;
            let _flags = tokens.next()?;
            let interface = tokens.next()?.to_owned();
            Some(DefaultRoute { gateway, interface })
        })
        .collect()
}

// ── scutil --dns ────────────────────────────────────────────────────

/// One `resolver #N` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverBlock {
    pub nameservers: Vec<IpAddr>,
    /// Interface name from `if_index : 14 (en0)`.
    pub interface: Option<String>,
    /// Set for split-DNS resolvers (`domain : corp.example`).
    pub domain: Option<String>,
}

pub fn parse_scutil_dns(text: &str) -> Vec<ResolverBlock> {
    let mut blocks: Vec<ResolverBlock> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("resolver #") {
            blocks.push(ResolverBlock::default());
            continue;
        }
        let Some(block) = blocks.last_mut() else {
            continue;
        };
        let Some((key, value)) = trimmed.split_once(" : ") else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        if key.starts_with("nameserver[") {
            if let Ok(ip) = value.parse() {
                block.nameservers.push(ip);
            }
        } else if key == "if_index" {
            block.interface = value
                .split_once('(')
                .and_then(|(_, rest)| rest.strip_suffix(')'))
                .map(str::to_owned);
        } else if key == "domain" {
            block.domain = Some(value.to_owned());
        }
    }

    blocks
}

// ── networksetup -getairportnetwork ─────────────────────────────────

/// `Current Wi-Fi Network: HomeNet` → `HomeNet`.
pub fn parse_airport_ssid(text: &str) -> Option<String> {
    let line = text.lines().find(|l| l.contains("Network:"))?;
    let (_, ssid) = line.split_once("Network:")?;
    let ssid = ssid.trim();
    (!ssid.is_empty()).then(|| ssid.to_owned())
}

// ── ping ────────────────────────────────────────────────────────────

/// Round-trip time of the first reply (`time=12.3 ms`).
pub fn parse_ping_latency(text: &str) -> Option<f64> {
    let (_, rest) = text.split_once("time=")?;
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok()
}

// ── dig +short / kdig +short ────────────────────────────────────────

/// IPv4 answers from a short-form DNS answer. CNAME targets, comments and
/// blank lines are discarded; strict dotted-quad parsing only.
pub fn parse_ipv4_tokens(text: &str) -> Vec<Ipv4Addr> {
    let mut ips: Vec<Ipv4Addr> = Vec::new();
    for token in text.lines().map(str::trim) {
        if token.is_empty() || token.starts_with(';') {
            continue;
        }
        if let Ok(ip) = token.parse::<Ipv4Addr>() {
            if !ips.contains(&ip) {
                ips.push(ip);
            }
        }
    }
    ips
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const IFCONFIG_MACOS: &str = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\toptions=1203<RXCSUM,TXCSUM,TXSTATUS,SW_TIMESTAMP>
\tinet 127.0.0.1 netmask 0xff000000
\tinet6 ::1 prefixlen 128
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether a4:83:e7:00:00:00
\tinet 192.168.1.23 netmask 0xffffff00 broadcast 192.168.1.255
\tstatus: active
utun2: flags=8050<POINTOPOINT,RUNNING,MULTICAST> mtu 1380
\tinet 10.9.0.2 --> 10.9.0.2 netmask 0xffffffff
utun3: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1400
\tinet 10.8.0.6 --> 10.8.0.6 netmask 0xffffffff
";

    #[test]
    fn ifconfig_blocks() {
        let blocks = parse_interfaces(IFCONFIG_MACOS);
        let names: Vec<&str> = blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["lo0", "en0", "utun2", "utun3"]);

        assert!(!blocks[2].up, "utun2 lacks UP");
        assert!(blocks[3].up);
        assert_eq!(blocks[3].ipv4, vec![Ipv4Addr::new(10, 8, 0, 6)]);
        // `status: active` is indented, so it doesn't open a block
        assert_eq!(blocks[1].ipv4, vec![Ipv4Addr::new(192, 168, 1, 23)]);
    }

    #[test]
    fn ifconfig_linux_net_tools() {
        let text = "tun0: flags=4305<UP,POINTOPOINT,RUNNING,NOARP,MULTICAST>  mtu 1500\n        inet addr:10.4.0.2  P-t-P:10.4.0.2\n";
        let blocks = parse_interfaces(text);
        assert_eq!(blocks[0].ipv4, vec![Ipv4Addr::new(10, 4, 0, 2)]);
    }

    #[test]
    fn ifconfig_malformed_input() {
        assert!(parse_interfaces("").is_empty());
        assert!(parse_interfaces("\tinet 10.0.0.1\nno colon here\n").is_empty());
        let blocks = parse_interfaces("utun9: flags=8051 mtu 1400\n\tinet 999.1.1.1\n");
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].up);
        assert!(blocks[0].ipv4.is_empty());
    }

    #[test]
    fn process_names_lowercased() {
        let names = parse_process_names("  /Applications/GlobalProtect.app/Contents/MacOS/PanGPS\n\nlaunchd\n");
        assert_eq!(
            names,
            vec!["/applications/globalprotect.app/contents/macos/pangps", "launchd"]
        );
    }

    #[test]
    fn exit_node_detection() {
        assert!(parse_exit_node_status(
            r#"{"BackendState":"Running","ExitNodeStatus":{"ID":"n1","Online":true}}"#
        ));
        assert!(parse_exit_node_status(
            r#"{"BackendState":"Running","Peer":{"a":{"ExitNode":false},"b":{"ExitNode":true}}}"#
        ));
        assert!(!parse_exit_node_status(
            r#"{"BackendState":"Stopped","ExitNodeStatus":{"Online":true}}"#
        ));
        assert!(!parse_exit_node_status(r#"{"BackendState":"Running","Peer":{}}"#));
        assert!(!parse_exit_node_status("not json"));
    }

    #[test]
    fn router_field() {
        let text = "DHCP Configuration\nIP address: 192.168.1.23\nSubnet mask: 255.255.255.0\nRouter: 192.168.1.1\nClient ID: \n";
        assert_eq!(parse_router_field(text), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(parse_router_field("Router: none\n"), None);
        assert_eq!(parse_router_field("Router: (null)\n"), None);
        assert_eq!(parse_router_field("Router:\n"), None);
        assert_eq!(
            parse_router_field("** Error: The parameters were not valid.\n"),
            None
        );
    }

    #[test]
    fn route_get_fields() {
        let text = "   route to: default\ndestination: default\n       mask: default\n    gateway: 192.168.1.1\n  interface: en0\n      flags: <UP,GATEWAY,DONE,STATIC,PRCLONING>\n";
        assert_eq!(
            parse_route_get(text),
            RouteLookup {
                gateway: Some(Ipv4Addr::new(192, 168, 1, 1)),
                interface: Some("en0".into()),
            }
        );
        let direct = parse_route_get("    route to: 10.0.0.5\n  interface: utun3\n");
        assert_eq!(direct.gateway, None);
        assert_eq!(direct.interface.as_deref(), Some("utun3"));
    }

    #[test]
    fn netstat_default_rows() {
        let text = "\
Routing tables

Internet:
Destination        Gateway            Flags               Netif Expire
default            10.8.0.1           UGScg               utun3
default            192.168.1.1        UGScIg                en0
default            link#17            UCSIg             bridge0
127                127.0.0.1          UCS                   lo0
";
        assert_eq!(
            parse_netstat_defaults(text),
            vec![
                DefaultRoute {
                    gateway: Ipv4Addr::new(10, 8, 0, 1),
                    interface: "utun3".into()
                },
                DefaultRoute {
                    gateway: Ipv4Addr::new(192, 168, 1, 1),
                    interface: "en0".into()
                },
            ]
        );
    }

    #[test]
    fn scutil_resolver_blocks() {
        let text = "\
DNS configuration

resolver #1
  search domain[0] : corp.example
  nameserver[0] : 10.8.0.53
  if_index : 21 (utun3)
  flags    : Request A records
  reach    : 0x00000003 (Reachable,Transient Connection)

resolver #2
  domain   : local
  options  : mdns
  timeout  : 5

DNS configuration (for scoped queries)

resolver #1
  nameserver[0] : 192.168.1.1
  nameserver[1] : fe80::1%en0
  if_index : 14 (en0)
  flags    : Scoped, Request A records
";
        let blocks = parse_scutil_dns(text);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].interface.as_deref(), Some("utun3"));
        assert_eq!(blocks[1].domain.as_deref(), Some("local"));
        assert!(blocks[1].nameservers.is_empty());
        assert_eq!(
            blocks[2].nameservers,
            vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))]
        );
        assert_eq!(blocks[2].interface.as_deref(), Some("en0"));
    }

    #[test]
    fn airport_ssid() {
        assert_eq!(
            parse_airport_ssid("Current Wi-Fi Network: Home Net 5G\n").as_deref(),
            Some("Home Net 5G")
        );
        assert_eq!(
            parse_airport_ssid("You are not associated with an AirPort network.\n"),
            None
        );
    }

    #[test]
    fn ping_latency() {
        let text = "PING 1.1.1.1 (1.1.1.1): 56 data bytes\n64 bytes from 1.1.1.1: icmp_seq=0 ttl=57 time=14.532 ms\n";
        assert_eq!(parse_ping_latency(text), Some(14.532));
        assert_eq!(parse_ping_latency("Request timeout for icmp_seq 0\n"), None);
    }

    #[test]
    fn short_answers_keep_only_dotted_quads() {
        let text = "web.telegram.org.cdn.example.\n149.154.167.99\n\n;; connection timed out\n149.154.167.99\n300.1.1.1\n1.2.3\n";
        assert_eq!(
            parse_ipv4_tokens(text),
            vec![Ipv4Addr::new(149, 154, 167, 99)]
        );
        assert!(parse_ipv4_tokens("").is_empty());
    }
}
