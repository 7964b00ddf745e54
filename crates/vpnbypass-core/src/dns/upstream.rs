// ── Fallback DNS upstreams ──

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use url::Url;

const DOT_PORT: u16 = 853;

/// One configured fallback resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream {
    /// Classic DNS over UDP/TCP port 53.
    Plain(IpAddr),
    /// DNS-over-HTTPS, JSON API (`?name=…&type=A`).
    Doh(Url),
    /// DNS-over-TLS, queried through an external TLS-capable tool.
    Dot { host: String, port: u16 },
}

impl Upstream {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plain(_) => "plain",
            Self::Doh(_) => "doh",
            Self::Dot { .. } => "dot",
        }
    }
}

impl FromStr for Upstream {
    type Err = String;

    /// Accepts `1.1.1.1`, `https://dns.example/dns-query`,
    /// `tls://dns.example[:port]` and `dns.example:853`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("https://") {
            return Url::parse(s)
                .map(Self::Doh)
                .map_err(|e| format!("invalid DoH URL {s}: {e}"));
        }
        if let Some(rest) = s.strip_prefix("tls://") {
            let rest = rest.trim_end_matches('/');
            return match rest.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() => port
                    .parse()
                    .map(|port| Self::Dot {
                        host: host.to_owned(),
                        port,
                    })
                    .map_err(|_| format!("invalid DoT port in {s}")),
                Some(_) => Err(format!("missing DoT host in {s}")),
                None if rest.is_empty() => Err(format!("missing DoT host in {s}")),
                None => Ok(Self::Dot {
                    host: rest.to_owned(),
                    port: DOT_PORT,
                }),
            };
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::Plain(ip));
        }
        match s.rsplit_once(':') {
            Some((host, "853")) if !host.is_empty() => Ok(Self::Dot {
                host: host.to_owned(),
                port: DOT_PORT,
            }),
            _ => Err(format!("unrecognized DNS upstream: {s}")),
        }
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(ip) => write!(f, "{ip}"),
            Self::Doh(url) => write!(f, "{url}"),
            Self::Dot { host, port } => write!(f, "tls://{host}:{port}"),
        }
    }
}
