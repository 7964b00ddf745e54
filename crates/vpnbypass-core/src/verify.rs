// ── Route verification ──

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use tracing::debug;

use crate::model::{ActiveRoute, RouteVerificationResult};
use crate::probe::Probe;

/// Checks that installed routes really point at the expected gateway.
#[derive(Debug, Clone)]
pub struct RouteVerifier {
    probe: Probe,
    concurrency: usize,
}

impl RouteVerifier {
    pub fn new(probe: Probe, concurrency: usize) -> Self {
        Self {
            probe,
            concurrency: concurrency.max(1),
        }
    }

    /// Verify `routes` with bounded parallelism. Results are in input
    /// order.
    pub async fn verify(&self, routes: &[ActiveRoute]) -> Vec<RouteVerificationResult> {
        // futures are built up front so the stream holds no borrowing
        // closure and stays Send inside the command processor
        let checks: Vec<_> = routes.iter().map(|route| self.verify_one(route)).collect();
        stream::iter(checks)
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// `route -n get` must name the route's gateway; a single ping then
    /// records latency. Network routes are probed at their first host.
    pub async fn verify_one(&self, route: &ActiveRoute) -> RouteVerificationResult {
        let mut result = RouteVerificationResult {
            destination: route.destination.clone(),
            reachable: false,
            latency_ms: None,
            error: None,
            checked_at: Utc::now(),
        };

        let Some(target) = route.probe_target() else {
            result.error = Some("destination has no probe address".into());
            return result;
        };

        match self.probe.route_lookup(&target.to_string()).await {
            Ok(lookup) if lookup.gateway == Some(route.gateway) => {
                result.reachable = true;
                result.latency_ms = self.probe.ping(target).await;
            }
            Ok(lookup) => {
                let via = lookup
                    .gateway
                    .map_or_else(|| "no gateway".to_owned(), |gw| gw.to_string());
                let iface = lookup.interface.unwrap_or_else(|| "?".into());
                result.error = Some(format!("routed via {via} on {iface}"));
            }
            Err(e) => result.error = Some(e.to_string()),
        }

        debug!(
            destination = %route.destination,
            reachable = result.reachable,
            latency_ms = ?result.latency_ms,
            "verified route"
        );
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::ToolPaths;
    use crate::testing::ScriptedRunner;

    const GW: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    fn verifier(runner: &Arc<ScriptedRunner>) -> RouteVerifier {
        let probe = Probe::new(runner.clone(), Duration::from_secs(1), ToolPaths::default());
        RouteVerifier::new(probe, 4)
    }

    #[tokio::test]
    async fn bypassed_route_is_reachable_with_latency() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok(
            "route -n get 1.2.3.4",
            "   route to: 1.2.3.4\n    gateway: 192.168.1.1\n  interface: en0\n",
        );
        runner.ok(
            "ping -c 1 -t 2 1.2.3.4",
            "64 bytes from 1.2.3.4: icmp_seq=0 ttl=57 time=12.345 ms\n",
        );

        let route = ActiveRoute::host(Ipv4Addr::new(1, 2, 3, 4), GW, "example.com", Utc::now());
        let results = verifier(&runner).verify(&[route]).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].reachable);
        assert_eq!(results[0].latency_ms, Some(12.345));
        assert!(results[0].error.is_none());
    }

    #[tokio::test]
    async fn route_through_tunnel_is_not_reachable() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok(
            "route -n get 91.108.4.1",
            "    gateway: 10.8.0.1\n  interface: utun3\n",
        );

        let route = ActiveRoute::network("91.108.4.0/22".parse().unwrap(), GW, "Telegram", Utc::now());
        let result = verifier(&runner).verify_one(&route).await;

        assert!(!result.reachable);
        assert_eq!(result.error.as_deref(), Some("routed via 10.8.0.1 on utun3"));
        assert_eq!(runner.count("ping"), 0);
    }

    #[tokio::test]
    async fn batch_verification_runs_on_spawned_task_in_order() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.ok("route -n get 1.2.3.4", "    gateway: 192.168.1.1\n  interface: en0\n");
        let verifier = verifier(&runner);
        let routes = vec![
            ActiveRoute::host(Ipv4Addr::new(1, 2, 3, 4), GW, "a.example", Utc::now()),
            ActiveRoute::host(Ipv4Addr::new(5, 6, 7, 8), GW, "b.example", Utc::now()),
        ];

        let results = tokio::spawn(async move { verifier.verify(&routes).await })
            .await
            .unwrap();

        let destinations: Vec<&str> = results.iter().map(|r| r.destination.as_str()).collect();
        assert_eq!(destinations, vec!["1.2.3.4", "5.6.7.8"]);
        assert!(results[0].reachable);
        assert!(!results[1].reachable);
    }

    #[tokio::test]
    async fn lookup_failure_is_reported() {
        let runner = Arc::new(ScriptedRunner::new());
        let route = ActiveRoute::host(Ipv4Addr::new(5, 6, 7, 8), GW, "example.com", Utc::now());
        let result = verifier(&runner).verify_one(&route).await;
        assert!(!result.reachable);
        assert!(result.error.is_some());
    }
}
