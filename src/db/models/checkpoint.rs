use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Indexer sync progress checkpoint (PostgreSQL).
///
/// Tracks the last block fully applied for the configured chain. The sole
/// source of truth for how far behind the indexer is; advanced only after a
/// backfill window has been completely applied, and never moved backward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub chain_id: i64,
    pub last_applied_block: i64,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    pub fn new(chain_id: i64, last_applied_block: i64) -> Self {
        Self {
            chain_id,
            last_applied_block,
            updated_at: Utc::now(),
        }
    }
}
