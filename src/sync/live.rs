//! Live subscription path: apply matching log entries as they arrive.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::db::EventStore;
use crate::gateway::{ChainGateway, RawLogEntry};
use crate::sync::apply::{ApplyStatus, EventApplier};
use crate::sync::decoder::{decode, DecodeError};

/// Consumes the gateway's live log stream and applies each entry through
/// the same path as the backfill reconciler.
///
/// The gateway's at-least-once semantics — duplicates, and overlap with the
/// reconciler's tail — are absorbed by the idempotent applies. On stream
/// loss the subscriber reconnects with exponential backoff and signals the
/// orchestrator so a reconcile pass closes whatever gap opened; it never
/// backfills on its own.
pub struct LiveSubscriber<G, S> {
    gateway: Arc<G>,
    applier: Arc<EventApplier<S>>,
    reconnected: Arc<Notify>,
    initial_delay: Duration,
    max_delay: Duration,
}

impl<G: ChainGateway, S: EventStore> LiveSubscriber<G, S> {
    pub fn new(
        gateway: Arc<G>,
        applier: Arc<EventApplier<S>>,
        reconnected: Arc<Notify>,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            gateway,
            applier,
            reconnected,
            initial_delay,
            max_delay,
        }
    }

    /// Run until cancelled.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut delay = self.initial_delay;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            match self.gateway.subscribe().await {
                Ok(stream) => {
                    info!("Live log subscription established");
                    delay = self.initial_delay;
                    // Whatever was missed while disconnected is the
                    // reconciler's job; nudge it.
                    self.reconnected.notify_one();

                    self.consume(stream, &cancel).await;
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    warn!("Live log subscription ended, reconnecting");
                },
                Err(e) => {
                    warn!("Failed to open log subscription: {}", e);
                },
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {},
            }
            delay = (delay * 2).min(self.max_delay);
        }
    }

    async fn consume(&self, mut stream: BoxStream<'static, RawLogEntry>, cancel: &CancellationToken) {
        loop {
            let entry = tokio::select! {
                _ = cancel.cancelled() => return,
                entry = stream.next() => match entry {
                    Some(entry) => entry,
                    None => return,
                },
            };

            if let Err(e) = self.handle_entry(&entry).await {
                // Store-level failure: drop the stream and let reconnect +
                // reconcile replay the entry idempotently.
                warn!(
                    "Failed to apply live entry at block {}: {:#}",
                    entry.block_number, e
                );
                return;
            }
        }
    }

    async fn handle_entry(&self, entry: &RawLogEntry) -> anyhow::Result<()> {
        let event = match decode(entry) {
            Ok(event) => event,
            Err(DecodeError::Unrecognized) => {
                debug!(
                    "Skipping unrecognized live log at block {} index {}",
                    entry.block_number, entry.log_index
                );
                return Ok(());
            },
            Err(e) => {
                warn!(
                    "Skipping undecodable live log at block {} index {}: {}",
                    entry.block_number, entry.log_index, e
                );
                return Ok(());
            },
        };

        match self.applier.apply(&event, entry.block_number).await? {
            ApplyStatus::Applied => {},
            ApplyStatus::AlreadyApplied => {
                debug!("Live entry {} already applied", event.key());
            },
            ApplyStatus::BountyMissing => {
                self.applier.park_claim(&event, entry.block_number).await?;
            },
        }
        Ok(())
    }
}
