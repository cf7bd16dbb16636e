use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use crate::engine::llm_client::ModelParams;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    data: String,
    /// Unix seconds.
    expires_at: f64,
}

/// File-per-entry response cache with a fixed time-to-live.
///
/// Entries are content addressed, so concurrent writers of one key write the
/// same value. Anything unreadable is deleted and reported as a miss.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// Stable fingerprint of a request: prompt, model and sampling
    /// parameters.
    pub fn key(prompt: &str, params: &ModelParams) -> String {
        let sampling = json!({
            "temperature": params.temperature,
            "top_p": params.top_p,
            "top_k": params.top_k,
        });

        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update(b"|");
        hasher.update(params.model.as_bytes());
        hasher.update(b"|");
        hasher.update(sampling.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, SystemTime::now()).await
    }

    pub async fn put(&self, key: &str, data: &str) {
        self.put_at(key, data, SystemTime::now()).await;
    }

    async fn get_at(&self, key: &str, now: SystemTime) -> Option<String> {
        let path = self.entry_path(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(cache_key = key, error = %e, "unreadable cache entry");
                self.evict(&path).await;
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(cache_key = key, error = %e, "corrupt cache entry");
                self.evict(&path).await;
                return None;
            }
        };

        if entry.expires_at < unix_seconds(now) {
            debug!(cache_key = key, "expired cache entry");
            self.evict(&path).await;
            return None;
        }

        Some(entry.data)
    }

    async fn put_at(&self, key: &str, data: &str, now: SystemTime) {
        let entry = CacheEntry {
            data: data.to_string(),
            expires_at: unix_seconds(now) + self.ttl.as_secs_f64(),
        };

        if let Err(e) = self.write_entry(key, &entry).await {
            warn!(cache_key = key, error = %e, "failed to write cache entry");
        }
    }

    async fn write_entry(&self, key: &str, entry: &CacheEntry) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string(entry)?;
        fs::write(self.entry_path(key), json).await
    }

    async fn evict(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove cache entry");
            }
        }
    }
}

fn unix_seconds(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
