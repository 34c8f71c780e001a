//! Observed connection health persistence
//!
//! The reconciler rebuilds the full [`ConnectionState`] every tick and
//! persists it as a snapshot keyed by the interface identifier. The durable
//! copy is a snapshot, not a log: each save overwrites the previous one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Overlay address to "currently connected" as observed at the last tick.
pub type ConnectionState = HashMap<String, bool>;

/// On-disk snapshot format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub interface: String,
    /// Unix seconds at persist time.
    pub updated_at: u64,
    pub peers: ConnectionState,
}

/// Durable store for connection-state snapshots.
pub trait StateStore: Send + Sync {
    fn save(&self, interface: &str, state: &ConnectionState) -> Result<()>;
}

/// Stores snapshots as JSON files, one per interface, under a state
/// directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, interface: &str) -> PathBuf {
        self.dir.join(format!("{}.json", interface))
    }

    /// Read back the last persisted snapshot, if any.
    pub fn load(&self, interface: &str) -> Result<Option<StateSnapshot>> {
        let path = self.path_for(interface);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading state snapshot {}", path.display()))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("decoding state snapshot {}", path.display()))?;
        Ok(Some(snapshot))
    }
}

impl StateStore for FileStateStore {
    fn save(&self, interface: &str, state: &ConnectionState) -> Result<()> {
        let snapshot = StateSnapshot {
            interface: interface.to_string(),
            updated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            peers: state.clone(),
        };

        std::fs::create_dir_all(&self.dir).context("creating state directory")?;
        let path = self.path_for(interface);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(&snapshot).context("encoding state snapshot")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("writing state snapshot {}", tmp.display()))?;
        // Rename so readers never observe a partially written snapshot.
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("replacing state snapshot {}", path.display()))?;
        Ok(())
    }
}
