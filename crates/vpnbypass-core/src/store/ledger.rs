// ── Active route ledger ──
//
// The installed route set, persisted so a later process (the next CLI
// invocation, a restarted daemon) knows what it has to clean up.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::ActiveRoute;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    routes: Vec<ActiveRoute>,
}

/// Routes recorded at `path`. Missing or corrupt files read as empty.
pub fn load_routes(path: &Path) -> Vec<ActiveRoute> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<LedgerFile>(&raw) {
            Ok(file) => {
                debug!(path = %path.display(), routes = file.routes.len(), "loaded route ledger");
                file.routes
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt route ledger");
                Vec::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read route ledger");
            Vec::new()
        }
    }
}

/// Replace the ledger at `path` (temp file + rename).
pub async fn save_routes(path: &Path, routes: &[ActiveRoute]) -> std::io::Result<()> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        routes: &'a [ActiveRoute],
    }

    let body = serde_json::to_vec_pretty(&Borrowed { routes }).map_err(std::io::Error::other)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), routes = routes.len(), "saved route ledger");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn ledger_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("routes.json");
        assert!(load_routes(&path).is_empty());

        let routes = vec![
            ActiveRoute::host(
                Ipv4Addr::new(1, 2, 3, 4),
                Ipv4Addr::new(192, 168, 1, 1),
                "example.com",
                Utc::now(),
            ),
            ActiveRoute::network(
                "91.108.4.0/22".parse().unwrap(),
                Ipv4Addr::new(192, 168, 1, 1),
                "Telegram",
                Utc::now(),
            ),
        ];
        save_routes(&path, &routes).await.unwrap();
        assert_eq!(load_routes(&path), routes);
    }

    #[test]
    fn corrupt_ledger_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");
        std::fs::write(&path, "[").unwrap();
        assert!(load_routes(&path).is_empty());
    }
}
