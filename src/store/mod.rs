//! Persisted market snapshot storage

pub mod disk;
pub mod memory;

use crate::core::market::MarketRecord;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk schema. Bump on any incompatible change to
/// [`MarketSnapshot`]; older snapshots are discarded, not migrated.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// A full market listing together with the time it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub schema_version: u32,
    pub fetched_at: DateTime<Utc>,
    pub records: Vec<MarketRecord>,
}

impl MarketSnapshot {
    pub fn new(fetched_at: DateTime<Utc>, records: Vec<MarketRecord>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            fetched_at,
            records,
        }
    }

    /// Whether the snapshot was fetched within the last `ttl_secs` seconds.
    pub fn is_fresh(&self, ttl_secs: u64, now: DateTime<Utc>) -> bool {
        is_fresh(self.fetched_at, ttl_secs, now)
    }
}

/// Whether `fetched_at` lies within the last `ttl_secs` seconds. Timestamps
/// from the future are not trusted.
pub fn is_fresh(fetched_at: DateTime<Utc>, ttl_secs: u64, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(fetched_at);
    age >= chrono::Duration::zero() && age.num_seconds() < ttl_secs as i64
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns the stored snapshot, or `None` when nothing usable is stored.
    /// A corrupt or foreign-schema entry reads as a miss.
    async fn load(&self) -> Option<MarketSnapshot>;

    async fn save(&self, snapshot: &MarketSnapshot) -> Result<()>;
}
