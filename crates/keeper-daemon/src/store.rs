use async_trait::async_trait;
use chrono::{DateTime, Local};
use keeper_proto::protocol::Snapshot;
use std::path::{Path, PathBuf};

/// Destination for shadow-state snapshots.  Nothing reads snapshots back;
/// they exist for post-mortem inspection.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

/// Overwrites one JSON file per process run, named after the start time.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(dir: &Path, started: DateTime<Local>) -> Self {
        let name = format!("{}.savestate.json", started.format("%Y-%m-%dT%H-%M-%S%.6f"));
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceStore for JsonSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
