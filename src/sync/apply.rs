//! Shared decode-and-apply path for the backfill reconciler and the live
//! subscriber.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};

use crate::db::models::{BountyRecord, PendingClaim, TransferRecord};
use crate::db::{ApplyOutcome, ClaimOutcome, EventStore};
use crate::pubsub::NotificationBus;
use crate::sync::decoder::DomainEvent;
use crate::sync::health::SyncHealth;

/// What happened to an event on its way into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    AlreadyApplied,
    /// A claim whose bounty row does not exist yet.
    BountyMissing,
}

/// Applies decoded events to the store and publishes the fresh ones.
///
/// An event is published only when the store reports it `Applied`, so a
/// notification can never precede durable persistence, and duplicate
/// delivery (reconciler/subscriber overlap, gateway replays) publishes
/// nothing the second time.
pub struct EventApplier<S> {
    chain_id: i64,
    store: Arc<S>,
    bus: Arc<dyn NotificationBus>,
    health: Arc<SyncHealth>,
}

impl<S: EventStore> EventApplier<S> {
    pub fn new(
        chain_id: i64,
        store: Arc<S>,
        bus: Arc<dyn NotificationBus>,
        health: Arc<SyncHealth>,
    ) -> Self {
        Self {
            chain_id,
            store,
            bus,
            health,
        }
    }

    pub async fn apply(
        &self,
        event: &DomainEvent,
        block_number: u64,
    ) -> anyhow::Result<ApplyStatus> {
        let status = match event {
            DomainEvent::TransferSent {
                sender,
                recipient,
                amount,
                message,
                occurred_at,
                tx_hash,
                log_index,
            } => {
                let record = TransferRecord {
                    chain_id: self.chain_id,
                    tx_hash: tx_hash.clone(),
                    log_index: *log_index as i64,
                    block_number: block_number as i64,
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                    amount: amount.clone(),
                    message: message.clone(),
                    occurred_at: *occurred_at,
                };
                self.store.upsert_transfer(&record).await?.into()
            },
            DomainEvent::BountyOpened {
                bounty_id,
                creator,
                title,
                description,
                amount,
                deadline,
                tx_hash,
                log_index,
            } => {
                let record = BountyRecord::opened(
                    self.chain_id,
                    bounty_id.clone(),
                    creator.clone(),
                    title.clone(),
                    description.clone(),
                    amount.clone(),
                    *deadline,
                    block_number as i64,
                    tx_hash.clone(),
                    *log_index as i64,
                );
                self.store.upsert_bounty_opened(&record).await?.into()
            },
            DomainEvent::BountyClaimed {
                bounty_id,
                claimer,
                content_uri,
                tx_hash,
                log_index,
            } => match self
                .store
                .apply_bounty_claim(bounty_id, claimer, content_uri, tx_hash, *log_index as i64)
                .await?
            {
                ClaimOutcome::Applied => ApplyStatus::Applied,
                ClaimOutcome::AlreadyApplied => ApplyStatus::AlreadyApplied,
                ClaimOutcome::NotFound => ApplyStatus::BountyMissing,
            },
        };

        match status {
            ApplyStatus::Applied => {
                self.bus.publish(event).await;
                self.health.record_applied(block_number);
            },
            ApplyStatus::AlreadyApplied => {
                debug!("Skipping duplicate {} {}", event.kind(), event.key());
            },
            ApplyStatus::BountyMissing => {},
        }

        Ok(status)
    }

    /// Park a claim that arrived before its bounty. Durable, so the retry
    /// survives restarts; the next reconcile pass picks it up.
    pub async fn park_claim(&self, event: &DomainEvent, block_number: u64) -> anyhow::Result<()> {
        let DomainEvent::BountyClaimed {
            bounty_id,
            claimer,
            content_uri,
            tx_hash,
            log_index,
        } = event
        else {
            return Ok(());
        };

        warn!(
            "Bounty {} missing for claim {}; parking claim for retry",
            bounty_id,
            event.key()
        );
        self.store
            .record_pending_claim(&PendingClaim {
                chain_id: self.chain_id,
                bounty_id: bounty_id.clone(),
                claimer: claimer.clone(),
                content_uri: content_uri.clone(),
                tx_hash: tx_hash.clone(),
                log_index: *log_index as i64,
                block_number: block_number as i64,
                first_seen_at: Utc::now(),
            })
            .await
    }

    /// Re-attempt previously parked claims and resolve the ones whose
    /// bounty has since appeared. Claims that are still orphaned stay
    /// parked and are reported as anomalies.
    pub async fn retry_pending_claims(&self) -> anyhow::Result<()> {
        for claim in self.store.pending_claims(self.chain_id).await? {
            let outcome = self
                .store
                .apply_bounty_claim(
                    &claim.bounty_id,
                    &claim.claimer,
                    &claim.content_uri,
                    &claim.tx_hash,
                    claim.log_index,
                )
                .await?;

            match outcome {
                ClaimOutcome::NotFound => {
                    warn!(
                        "Bounty {} still missing for claim parked since {}",
                        claim.bounty_id, claim.first_seen_at
                    );
                },
                ClaimOutcome::Applied => {
                    let event = DomainEvent::BountyClaimed {
                        bounty_id: claim.bounty_id.clone(),
                        claimer: claim.claimer.clone(),
                        content_uri: claim.content_uri.clone(),
                        tx_hash: claim.tx_hash.clone(),
                        log_index: claim.log_index as u64,
                    };
                    self.bus.publish(&event).await;
                    self.health.record_applied(claim.block_number as u64);
                    self.store
                        .resolve_pending_claim(&claim.tx_hash, claim.log_index)
                        .await?;
                },
                ClaimOutcome::AlreadyApplied => {
                    self.store
                        .resolve_pending_claim(&claim.tx_hash, claim.log_index)
                        .await?;
                },
            }
        }
        Ok(())
    }
}

impl From<ApplyOutcome> for ApplyStatus {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Applied => ApplyStatus::Applied,
            ApplyOutcome::AlreadyApplied => ApplyStatus::AlreadyApplied,
        }
    }
}
