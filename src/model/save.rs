use serde::{Deserialize, Serialize};

use crate::model::effect::EffectTree;

pub const FORMAT_VERSION: &str = "0.1.0";

/// On-disk shape of a saved futurecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFuturecast {
    pub tree: EffectTree,
    pub summary: String,
    /// Local time of the save, `YYYYMMDD_HHMMSS`.
    pub timestamp: String,
    pub version: String,
}

impl SavedFuturecast {
    pub fn new(tree: EffectTree, summary: String, timestamp: String) -> Self {
        Self {
            tree,
            summary,
            timestamp,
            version: FORMAT_VERSION.to_string(),
        }
    }
}
