// Route helper client
//
// Talks newline-delimited JSON to the privileged helper over a Unix
// domain socket. Every request opens a fresh connection, so a crashed
// or restarted helper is picked up without reconnect logic.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::error::Error;
use crate::executor::RouteExecutor;
use crate::protocol::{BatchOutcome, HelperRequest, HelperResponse, HostsEntry, RouteSpec};

/// Raw client for the privileged route helper.
#[derive(Debug, Clone)]
pub struct HelperClient {
    socket_path: PathBuf,
    /// Timeout for single operations.
    timeout: Duration,
    /// Timeout for batch operations, which may touch hundreds of routes.
    batch_timeout: Duration,
}

impl HelperClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration, batch_timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
            batch_timeout,
        }
    }

    /// The socket this client connects to.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether the helper socket exists at all. Cheap pre-check; a
    /// successful [`version()`](RouteExecutor::version) call is the real test.
    pub fn is_installed(&self) -> bool {
        self.socket_path.exists()
    }

    /// Send one request and wait for the reply line.
    pub async fn call(&self, request: &HelperRequest) -> Result<HelperResponse, Error> {
        let limit = if request.is_batch() {
            self.batch_timeout
        } else {
            self.timeout
        };

        debug!(op = request.op(), path = %self.socket_path.display(), "helper request");

        tokio::time::timeout(limit, self.exchange(request))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: limit.as_secs(),
            })?
    }

    async fn exchange(&self, request: &HelperRequest) -> Result<HelperResponse, Error> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| Error::Unavailable {
                path: self.socket_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut payload = serde_json::to_vec(request).map_err(|e| Error::Protocol(e.to_string()))?;
        payload.push(b'\n');

        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(&payload).await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(Error::Protocol(
                "helper closed the connection without a response".into(),
            ));
        }
        trace!(body = line.trim_end(), "helper response");

        serde_json::from_str(line.trim_end()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: line.trim_end().to_owned(),
        })
    }

    /// Call and require `ok: true`.
    async fn call_ok(&self, request: &HelperRequest) -> Result<HelperResponse, Error> {
        let response = self.call(request).await?;
        if response.ok {
            Ok(response)
        } else {
            Err(Error::Rejected {
                message: response
                    .error
                    .unwrap_or_else(|| format!("{} failed", request.op())),
            })
        }
    }
}

#[async_trait]
impl RouteExecutor for HelperClient {
    async fn add_route(&self, route: &RouteSpec) -> Result<(), Error> {
        self.call_ok(&HelperRequest::AddRoute(route.clone()))
            .await
            .map(|_| ())
    }

    async fn remove_route(&self, destination: &str) -> Result<(), Error> {
        self.call_ok(&HelperRequest::RemoveRoute {
            destination: destination.to_owned(),
        })
        .await
        .map(|_| ())
    }

    async fn add_routes_batch(&self, routes: &[RouteSpec]) -> Result<BatchOutcome, Error> {
        if routes.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let response = self
            .call(&HelperRequest::AddRoutesBatch {
                routes: routes.to_vec(),
            })
            .await?;
        Ok(response.into_batch_outcome(routes.len()))
    }

    async fn remove_routes_batch(&self, destinations: &[String]) -> Result<BatchOutcome, Error> {
        if destinations.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let response = self
            .call(&HelperRequest::RemoveRoutesBatch {
                destinations: destinations.to_vec(),
            })
            .await?;
        Ok(response.into_batch_outcome(destinations.len()))
    }

    async fn update_hosts_file(&self, entries: &[HostsEntry]) -> Result<(), Error> {
        self.call_ok(&HelperRequest::UpdateHostsFile {
            entries: entries.to_vec(),
        })
        .await
        .map(|_| ())
    }

    async fn flush_dns_cache(&self) -> Result<(), Error> {
        self.call_ok(&HelperRequest::FlushDnsCache).await.map(|_| ())
    }

    async fn version(&self) -> Result<String, Error> {
        let response = self.call_ok(&HelperRequest::GetVersion).await?;
        response
            .version
            .ok_or_else(|| Error::Protocol("version reply without a version field".into()))
    }
}
