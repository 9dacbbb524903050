//! Historical catch-up from the persisted checkpoint to the chain tip.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::ChainSettings;
use crate::db::EventStore;
use crate::gateway::ChainGateway;
use crate::sync::apply::{ApplyStatus, EventApplier};
use crate::sync::decoder::{decode, DecodeError, DomainEvent};
use crate::sync::health::SyncHealth;

/// Base delay before retrying a failed window.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Cap on the window retry delay.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Interval between progress log lines during long catch-ups.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

enum Progress {
    Advanced(u64),
    CaughtUp(u64),
}

#[derive(Debug, Default)]
struct WindowStats {
    applied: usize,
    duplicates: usize,
    parked: usize,
    skipped: usize,
}

/// Walks historical block ranges from the checkpoint to
/// `current_height - confirmation_lag`, in bounded windows.
///
/// Per window: query, decode (skipping unrecognized entries), apply in
/// strict `(block_number, log_index)` order, then advance the checkpoint to
/// the window end. A window that fails is retried from its start — safe
/// because every apply is idempotent.
pub struct BackfillReconciler<G, S> {
    chain_id: i64,
    gateway: Arc<G>,
    store: Arc<S>,
    applier: Arc<EventApplier<S>>,
    health: Arc<SyncHealth>,
    start_block: u64,
    confirmation_lag: u64,
    block_window: u64,
}

impl<G: ChainGateway, S: EventStore> BackfillReconciler<G, S> {
    pub fn new(
        chain_id: i64,
        gateway: Arc<G>,
        store: Arc<S>,
        applier: Arc<EventApplier<S>>,
        health: Arc<SyncHealth>,
        settings: &ChainSettings,
    ) -> Self {
        Self {
            chain_id,
            gateway,
            store,
            applier,
            health,
            start_block: settings.start_block,
            confirmation_lag: settings.confirmation_lag,
            block_window: settings.block_window.max(1),
        }
    }

    /// Run windows until the checkpoint reaches the confirmed tip.
    ///
    /// Failures retry the current window from its start after backoff; the
    /// loop only returns once caught up or cancelled. Returns the last
    /// fully applied block.
    pub async fn run_to_caught_up(&self, cancel: &CancellationToken) -> anyhow::Result<u64> {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_progress_log = std::time::Instant::now();
        let mut last_known: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(last_known);
            }

            match self.step().await {
                Ok(Progress::CaughtUp(block)) => {
                    // Bounties opened during this pass may have unblocked
                    // parked claims.
                    if let Err(e) = self.applier.retry_pending_claims().await {
                        warn!("Failed to retry parked claims: {:#}", e);
                    }
                    return Ok(block);
                },
                Ok(Progress::Advanced(block)) => {
                    delay = RETRY_BASE_DELAY;
                    last_known = block;
                    if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                        info!("Chain {} backfilled to block {}", self.chain_id, block);
                        last_progress_log = std::time::Instant::now();
                    }
                },
                Err(e) => {
                    warn!(
                        "Backfill window failed, retrying in {:?}: {:#}",
                        delay, e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(last_known),
                        _ = tokio::time::sleep(delay) => {},
                    }
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                },
            }
        }
    }

    /// Process at most one window. Advances the checkpoint only after the
    /// window has been fully applied.
    async fn step(&self) -> anyhow::Result<Progress> {
        let last_applied = match self.store.get_sync_checkpoint(self.chain_id).await? {
            Some(checkpoint) => checkpoint.last_applied_block.max(0) as u64,
            None => {
                // First run: seed just below the configured start block so
                // the first window begins exactly there.
                let seed = self.start_block.saturating_sub(1);
                self.store
                    .set_sync_checkpoint(self.chain_id, seed as i64)
                    .await?;
                seed
            },
        };

        let head = self.gateway.current_height().await?;
        let target = head.saturating_sub(self.confirmation_lag);
        let from = last_applied + 1;

        if from > target {
            return Ok(Progress::CaughtUp(last_applied));
        }

        let to = target.min(from + self.block_window - 1);
        let stats = self.apply_window(from, to).await?;

        self.store.set_sync_checkpoint(self.chain_id, to as i64).await?;
        self.health.record_checkpoint(to);

        if stats.applied > 0 || stats.parked > 0 {
            info!(
                "Applied {} events in blocks {}..={} ({} duplicates, {} parked, {} skipped)",
                stats.applied, from, to, stats.duplicates, stats.parked, stats.skipped
            );
        } else {
            debug!("No new events in blocks {}..={}", from, to);
        }

        Ok(Progress::Advanced(to))
    }

    /// Apply one window in strict `(block_number, log_index)` order.
    async fn apply_window(&self, from: u64, to: u64) -> anyhow::Result<WindowStats> {
        let entries = self.gateway.query_range(from, to).await?;
        let mut stats = WindowStats::default();
        let mut deferred: Vec<(DomainEvent, u64)> = Vec::new();

        for entry in &entries {
            let event = match decode(entry) {
                Ok(event) => event,
                Err(DecodeError::Unrecognized) => {
                    debug!(
                        "Skipping unrecognized log at block {} index {}",
                        entry.block_number, entry.log_index
                    );
                    continue;
                },
                Err(e) => {
                    warn!(
                        "Skipping undecodable log at block {} index {}: {}",
                        entry.block_number, entry.log_index, e
                    );
                    stats.skipped += 1;
                    continue;
                },
            };

            match self.applier.apply(&event, entry.block_number).await? {
                ApplyStatus::Applied => stats.applied += 1,
                ApplyStatus::AlreadyApplied => stats.duplicates += 1,
                ApplyStatus::BountyMissing => deferred.push((event, entry.block_number)),
            }
        }

        // A claim can precede its open within the same window when the
        // range query interleaves two bounties; one more pass over the
        // deferred claims covers that. Whatever is still orphaned gets
        // parked durably.
        for (event, block_number) in deferred {
            match self.applier.apply(&event, block_number).await? {
                ApplyStatus::Applied => stats.applied += 1,
                ApplyStatus::AlreadyApplied => stats.duplicates += 1,
                ApplyStatus::BountyMissing => {
                    self.applier.park_claim(&event, block_number).await?;
                    stats.parked += 1;
                },
            }
        }

        Ok(stats)
    }
}
