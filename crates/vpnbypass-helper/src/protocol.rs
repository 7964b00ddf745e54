// Wire protocol spoken with the privileged route helper.
//
// One request per connection: the client writes a single JSON object
// terminated by `\n`, the helper answers with a single JSON line and
// closes. Requests are internally tagged by `op`.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// A single route to install, pointing `destination` at `gateway`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteSpec {
    /// Host IP (`1.2.3.4`) or network in CIDR form (`91.108.4.0/22`).
    pub destination: String,
    pub gateway: Ipv4Addr,
    /// `true` installs a network route (`-net`), `false` a host route.
    pub is_network: bool,
}

impl RouteSpec {
    pub fn host(ip: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            destination: ip.to_string(),
            gateway,
            is_network: false,
        }
    }

    pub fn network(cidr: impl Into<String>, gateway: Ipv4Addr) -> Self {
        Self {
            destination: cidr.into(),
            gateway,
            is_network: true,
        }
    }
}

/// One `ip domain` line of the managed hosts block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsEntry {
    pub domain: String,
    pub ip: Ipv4Addr,
}

/// Aggregate result of a batch submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success_count: u32,
    pub failure_count: u32,
    /// First helper-supplied error text, if any item failed.
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.failure_count == 0
    }

    /// Fold another partial outcome into this one, keeping the first error.
    pub fn merge(&mut self, other: BatchOutcome) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

/// Requests understood by the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HelperRequest {
    AddRoute(RouteSpec),
    RemoveRoute { destination: String },
    AddRoutesBatch { routes: Vec<RouteSpec> },
    RemoveRoutesBatch { destinations: Vec<String> },
    UpdateHostsFile { entries: Vec<HostsEntry> },
    FlushDnsCache,
    GetVersion,
}

impl HelperRequest {
    /// Short operation name for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Self::AddRoute(_) => "add_route",
            Self::RemoveRoute { .. } => "remove_route",
            Self::AddRoutesBatch { .. } => "add_routes_batch",
            Self::RemoveRoutesBatch { .. } => "remove_routes_batch",
            Self::UpdateHostsFile { .. } => "update_hosts_file",
            Self::FlushDnsCache => "flush_dns_cache",
            Self::GetVersion => "get_version",
        }
    }

    /// Batch requests can take much longer than single operations.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            Self::AddRoutesBatch { .. } | Self::RemoveRoutesBatch { .. }
        )
    }
}

/// The helper's reply. Fields irrelevant to the request are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub success_count: Option<u32>,
    #[serde(default)]
    pub failure_count: Option<u32>,
    #[serde(default)]
    pub version: Option<String>,
}

impl HelperResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Interpret a batch reply. A reply without counts is taken at face
    /// value for the whole batch.
    pub fn into_batch_outcome(self, batch_len: usize) -> BatchOutcome {
        let total = u32::try_from(batch_len).unwrap_or(u32::MAX);
        match (self.success_count, self.failure_count) {
            (Some(success_count), Some(failure_count)) => BatchOutcome {
                success_count,
                failure_count,
                error: self.error,
            },
            (Some(success_count), None) => BatchOutcome {
                success_count,
                failure_count: total.saturating_sub(success_count),
                error: self.error,
            },
            (None, Some(failure_count)) => BatchOutcome {
                success_count: total.saturating_sub(failure_count),
                failure_count,
                error: self.error,
            },
            (None, None) if self.ok => BatchOutcome {
                success_count: total,
                failure_count: 0,
                error: None,
            },
            (None, None) => BatchOutcome {
                success_count: 0,
                failure_count: total,
                error: self.error,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_is_tagged_by_op() {
        let req = HelperRequest::AddRoute(RouteSpec::host(
            Ipv4Addr::new(1, 2, 3, 4),
            Ipv4Addr::new(192, 168, 1, 1),
        ));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "op": "add_route",
                "destination": "1.2.3.4",
                "gateway": "192.168.1.1",
                "is_network": false
            })
        );
    }

    #[test]
    fn unit_request_serializes_to_op_only() {
        let json = serde_json::to_value(HelperRequest::GetVersion).unwrap();
        assert_eq!(json, serde_json::json!({ "op": "get_version" }));
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let resp: HelperResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert_eq!(resp, HelperResponse::ok());
    }

    #[test]
    fn batch_outcome_from_partial_counts() {
        let resp = HelperResponse {
            ok: false,
            success_count: Some(7),
            error: Some("one failed".into()),
            ..HelperResponse::default()
        };
        let outcome = resp.into_batch_outcome(8);
        assert_eq!(outcome.success_count, 7);
        assert_eq!(outcome.failure_count, 1);
        assert_eq!(outcome.error.as_deref(), Some("one failed"));
    }

    #[test]
    fn batch_outcome_without_counts_uses_ok_flag() {
        assert_eq!(HelperResponse::ok().into_batch_outcome(3).success_count, 3);
        let failed = HelperResponse::failed("denied").into_batch_outcome(3);
        assert_eq!(failed.failure_count, 3);
        assert!(!failed.is_clean());
    }

    #[test]
    fn merge_keeps_first_error() {
        let mut total = BatchOutcome {
            success_count: 2,
            failure_count: 1,
            error: Some("first".into()),
        };
        total.merge(BatchOutcome {
            success_count: 3,
            failure_count: 1,
            error: Some("second".into()),
        });
        assert_eq!(total.success_count, 5);
        assert_eq!(total.failure_count, 2);
        assert_eq!(total.error.as_deref(), Some("first"));
    }
}
