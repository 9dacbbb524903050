use async_trait::async_trait;

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

use crate::db::models::{BountyRecord, PendingClaim, SyncCheckpoint, TransferRecord};

/// Outcome of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The record was written for the first time.
    Applied,
    /// A record with the same key already existed; nothing was modified.
    AlreadyApplied,
}

/// Outcome of applying a bounty claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The bounty transitioned open -> claimed.
    Applied,
    /// The bounty was already claimed; nothing was modified.
    AlreadyApplied,
    /// No bounty row exists for this id yet. The claim arrived ahead of its
    /// open event and must be parked for retry, not dropped.
    NotFound,
}

/// Persistence boundary for projected chain events.
///
/// Every operation is safe to call any number of times with identical
/// input. The unique keys — `(tx_hash, log_index)` for transfers and parked
/// claims, `bounty_id` for bounties — are the concurrency-control
/// mechanism, so callers need no external locking even when the backfill
/// and live paths observe the same log entry.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn upsert_transfer(&self, record: &TransferRecord) -> anyhow::Result<ApplyOutcome>;

    async fn upsert_bounty_opened(&self, record: &BountyRecord) -> anyhow::Result<ApplyOutcome>;

    async fn apply_bounty_claim(
        &self,
        bounty_id: &str,
        claimer: &str,
        content_uri: &str,
        tx_hash: &str,
        log_index: i64,
    ) -> anyhow::Result<ClaimOutcome>;

    async fn get_sync_checkpoint(&self, chain_id: i64) -> anyhow::Result<Option<SyncCheckpoint>>;

    /// Advance the checkpoint. Implementations must never move it backward,
    /// whatever value the caller passes.
    async fn set_sync_checkpoint(
        &self,
        chain_id: i64,
        last_applied_block: i64,
    ) -> anyhow::Result<()>;

    async fn record_pending_claim(&self, claim: &PendingClaim) -> anyhow::Result<()>;

    async fn pending_claims(&self, chain_id: i64) -> anyhow::Result<Vec<PendingClaim>>;

    async fn resolve_pending_claim(&self, tx_hash: &str, log_index: i64) -> anyhow::Result<()>;
}
