use async_trait::async_trait;

use crate::error::Error;
use crate::protocol::{BatchOutcome, HostsEntry, RouteSpec};

/// Something able to mutate kernel routes and the hosts file.
///
/// Implemented by [`HelperClient`](crate::HelperClient) for the privileged
/// helper, and by the engine's direct fallback for when the helper is not
/// installed.
#[async_trait]
pub trait RouteExecutor: Send + Sync {
    async fn add_route(&self, route: &RouteSpec) -> Result<(), Error>;

    async fn remove_route(&self, destination: &str) -> Result<(), Error>;

    async fn add_routes_batch(&self, routes: &[RouteSpec]) -> Result<BatchOutcome, Error>;

    async fn remove_routes_batch(&self, destinations: &[String]) -> Result<BatchOutcome, Error>;

    /// Replace the managed block of the hosts file with `entries`.
    /// An empty slice clears the block.
    async fn update_hosts_file(&self, entries: &[HostsEntry]) -> Result<(), Error>;

    async fn flush_dns_cache(&self) -> Result<(), Error>;

    /// Version string reported by the executor.
    async fn version(&self) -> Result<String, Error>;
}
