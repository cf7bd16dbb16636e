use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::StorageError;
use crate::model::effect::EffectTree;
use crate::model::save::SavedFuturecast;

const LATEST_FILE: &str = "latest.json";

/// Directory of saved futurecasts.
///
/// Every save writes `futurecast_<timestamp>.json` and mirrors it to
/// `latest.json`. A save landing in the same second as an earlier one gets a
/// `_2`, `_3`, ... suffix instead of replacing it.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Saves under the current local time and returns the timestamped path.
    pub fn save(&self, tree: &EffectTree, summary: &str) -> Result<PathBuf, StorageError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        self.save_as(tree, summary, timestamp)
    }

    fn save_as(
        &self,
        tree: &EffectTree,
        summary: &str,
        timestamp: String,
    ) -> Result<PathBuf, StorageError> {
        let saved = SavedFuturecast::new(tree.clone(), summary.to_string(), timestamp);

        fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.unused_path(&saved.timestamp);

        let json = serde_json::to_string_pretty(&saved).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;

        for target in [&path, &self.latest_path()] {
            fs::write(target, &json).map_err(|source| StorageError::Io {
                path: target.to_path_buf(),
                source,
            })?;
        }

        info!(path = %path.display(), nodes = tree.node_count(), "futurecast saved");
        Ok(path)
    }

    fn unused_path(&self, timestamp: &str) -> PathBuf {
        let mut path = self.dir.join(format!("futurecast_{timestamp}.json"));
        let mut n = 2;
        while path.exists() {
            path = self.dir.join(format!("futurecast_{timestamp}_{n}.json"));
            n += 1;
        }
        path
    }

    /// Reads a saved futurecast. Ids are rebuilt from tree positions so
    /// files written with opaque ids stay addressable by path.
    pub fn load(&self, path: &Path) -> Result<SavedFuturecast, StorageError> {
        let raw = fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_path_buf())
            } else {
                StorageError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let mut saved: SavedFuturecast =
            serde_json::from_str(&raw).map_err(|source| StorageError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        saved.tree.reindex();

        info!(path = %path.display(), version = %saved.version, "futurecast loaded");
        Ok(saved)
    }

    pub fn load_latest(&self) -> Result<SavedFuturecast, StorageError> {
        self.load(&self.latest_path())
    }
}
