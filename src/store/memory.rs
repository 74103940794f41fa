use crate::store::{MarketSnapshot, SNAPSHOT_SCHEMA_VERSION, SnapshotStore};
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

/// In-process snapshot store. Used when the disk cache cannot be opened,
/// and as a test double.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<MarketSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the store, mainly for tests.
    pub fn with_snapshot(snapshot: MarketSnapshot) -> Self {
        Self {
            inner: Mutex::new(Some(snapshot)),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Option<MarketSnapshot> {
        let inner = self.inner.lock().await;
        let snapshot = inner.clone()?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            debug!(
                "Discarding snapshot with schema version {}",
                snapshot.schema_version
            );
            return None;
        }
        Some(snapshot)
    }

    async fn save(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let mut inner = self.inner.lock().await;
        *inner = Some(snapshot.clone());
        Ok(())
    }
}
