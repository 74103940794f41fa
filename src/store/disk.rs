use crate::store::{MarketSnapshot, SNAPSHOT_SCHEMA_VERSION, SnapshotStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const SNAPSHOT_KEY: &str = "markets/latest";

/// Snapshot store backed by a fjall keyspace on disk.
pub struct DiskStore {
    // Keeps the keyspace open for the lifetime of the partition handle.
    _keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create cache directory: {}", path.display()))?;

        let keyspace = Arc::new(
            fjall::Config::new(path.join("cache"))
                .open()
                .context("Failed to open snapshot cache")?,
        );
        let partition = keyspace
            .open_partition("markets", PartitionCreateOptions::default())
            .context("Failed to open markets partition")?;

        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }
}

#[async_trait]
impl SnapshotStore for DiskStore {
    async fn load(&self) -> Option<MarketSnapshot> {
        let bytes = match self.partition.get(SNAPSHOT_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("Snapshot cache MISS");
                return None;
            }
            Err(e) => {
                debug!("Snapshot cache read error: {}", e);
                return None;
            }
        };

        let snapshot: MarketSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Discarding undecodable snapshot: {}", e);
                return None;
            }
        };

        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            debug!(
                "Discarding snapshot with schema version {}",
                snapshot.schema_version
            );
            return None;
        }

        debug!(
            "Snapshot cache HIT ({} records, fetched at {})",
            snapshot.records.len(),
            snapshot.fetched_at
        );
        Some(snapshot)
    }

    async fn save(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;
        self.partition
            .insert(SNAPSHOT_KEY, bytes)
            .context("Failed to write snapshot")?;
        debug!("Snapshot cache PUT ({} records)", snapshot.records.len());
        Ok(())
    }
}
