// ── On-disk resolution cache ──
//
// Last-resort tier of the resolution pipeline: the most recent IP seen
// for each domain, persisted across runs. Loaded once at engine start,
// merged and rewritten after every apply/refresh.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: IndexMap<String, Ipv4Addr>,
}

#[derive(Debug, Default)]
pub struct DiskDnsCache {
    path: Option<PathBuf>,
    entries: RwLock<IndexMap<String, Ipv4Addr>>,
}

impl DiskDnsCache {
    /// A cache that is never written anywhere.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file is an empty cache; a corrupt one
    /// is logged and treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheFile>(&raw) {
                Ok(file) => file.entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring corrupt DNS cache");
                    IndexMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read DNS cache");
                IndexMap::new()
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded DNS cache");
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, domain: &str) -> Option<Ipv4Addr> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold in fresh resolutions. Returns whether anything changed.
    pub fn merge(&self, fresh: impl IntoIterator<Item = (String, Ipv4Addr)>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut changed = false;
        for (domain, ip) in fresh {
            if entries.insert(domain, ip) != Some(ip) {
                changed = true;
            }
        }
        changed
    }

    /// Write the cache atomically (temp file + rename). No-op for an
    /// in-memory cache.
    pub async fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CacheFile {
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        let body = serde_json::to_vec_pretty(&file).map_err(std::io::Error::other)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), entries = file.entries.len(), "saved DNS cache");
        Ok(())
    }
}
