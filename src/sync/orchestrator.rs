//! Top-level supervision: backfill to caught-up, hand off to the live
//! subscription, and keep reconciling.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::db::EventStore;
use crate::gateway::ChainGateway;
use crate::sync::backfill::BackfillReconciler;
use crate::sync::health::SyncHealth;
use crate::sync::live::LiveSubscriber;

/// Delay before restarting a failed live subscriber task.
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Sequences catch-up and live ingestion, and supervises both.
///
/// The reconciler runs to caught-up first, then again on a fixed interval
/// and on every subscriber reconnect, closing any gap the subscription
/// leaves. A live subscriber that dies is restarted after backoff. The
/// orchestrator itself only exits on cancellation.
pub struct SyncOrchestrator<G, S> {
    backfill: Arc<BackfillReconciler<G, S>>,
    subscriber: Arc<LiveSubscriber<G, S>>,
    health: Arc<SyncHealth>,
    reconnected: Arc<Notify>,
    reconcile_interval: Duration,
}

impl<G, S> SyncOrchestrator<G, S>
where
    G: ChainGateway + 'static,
    S: EventStore + 'static,
{
    pub fn new(
        backfill: Arc<BackfillReconciler<G, S>>,
        subscriber: Arc<LiveSubscriber<G, S>>,
        health: Arc<SyncHealth>,
        reconnected: Arc<Notify>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            backfill,
            subscriber,
            health,
            reconnected,
            reconcile_interval,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        // Initial catch-up before the live path starts.
        loop {
            match self.backfill.run_to_caught_up(&cancel).await {
                Ok(block) => {
                    info!(
                        "Backfill caught up at block {}, starting live subscription",
                        block
                    );
                    break;
                },
                Err(e) => {
                    error!("Initial catch-up failed: {:#}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(RESTART_DELAY) => {},
                    }
                },
            }
            if cancel.is_cancelled() {
                return Ok(());
            }
        }

        let mut live_handle = self.spawn_subscriber(&cancel);
        let mut interval = tokio::time::interval(self.reconcile_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial catch-up above
        // already covered it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    self.reconcile(&cancel).await;
                    self.log_health();
                },
                _ = self.reconnected.notified() => {
                    // Close whatever gap opened while the subscription was
                    // down.
                    self.reconcile(&cancel).await;
                },
                result = &mut live_handle => {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    match result {
                        Ok(Ok(())) => warn!("Live subscriber exited unexpectedly"),
                        Ok(Err(e)) => error!("Live subscriber failed: {:#}", e),
                        Err(e) => error!("Live subscriber panicked: {}", e),
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(RESTART_DELAY) => {},
                    }
                    live_handle = self.spawn_subscriber(&cancel);
                },
            }
        }

        let _ = live_handle.await;
        Ok(())
    }

    fn spawn_subscriber(&self, cancel: &CancellationToken) -> JoinHandle<anyhow::Result<()>> {
        let subscriber = self.subscriber.clone();
        let token = cancel.child_token();
        tokio::spawn(async move { subscriber.run(token).await })
    }

    async fn reconcile(&self, cancel: &CancellationToken) {
        if let Err(e) = self.backfill.run_to_caught_up(cancel).await {
            error!("Reconcile pass failed: {:#}", e);
        }
    }

    fn log_health(&self) {
        let snapshot = self.health.snapshot();
        match snapshot.seconds_since_last_event {
            Some(age) => info!(
                "Sync health: last applied block {}, last event {}s ago",
                snapshot.last_applied_block, age
            ),
            None => info!(
                "Sync health: last applied block {}, no events applied yet",
                snapshot.last_applied_block
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::sync::testing::*;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn outage_gap_is_closed_by_reconcile() {
        let h = Harness::new();
        // Historical blocks for the initial catch-up (head 10, lag 2).
        h.gateway.push_entry(transfer_entry(3, 0, tx(1), 1));
        h.gateway.push_entry(transfer_entry(7, 0, tx(2), 1));
        h.gateway.set_head(10);

        // First live session dies immediately (outage); while it is down
        // the chain advances past the subscription's reach.
        h.gateway.push_session(vec![], false);
        // The session that comes back up only carries the newest entry.
        h.gateway
            .push_session(vec![transfer_entry(18, 0, tx(5), 1)], true);

        let orchestrator = SyncOrchestrator::new(
            Arc::new(h.backfill(2, 100)),
            Arc::new(h.live()),
            h.health.clone(),
            h.reconnected.clone(),
            Duration::from_millis(50),
        );

        let cancel = CancellationToken::new();
        let handle = {
            let token = cancel.clone();
            tokio::spawn(async move { orchestrator.run(token).await })
        };

        // Initial catch-up lands first.
        let store = h.store.clone();
        wait_until(|| store.state.lock().unwrap().transfers.len() == 2).await;

        // The outage window: blocks that only a reconcile pass can recover.
        h.gateway.push_entry(transfer_entry(12, 0, tx(3), 1));
        h.gateway.push_entry(transfer_entry(15, 1, tx(4), 1));
        h.gateway.set_head(20);

        let store = h.store.clone();
        wait_until(|| {
            let state = store.state.lock().unwrap();
            state.transfers.len() == 5 && state.checkpoint == Some(18)
        })
        .await;

        cancel.cancel();
        handle.await.unwrap().unwrap();

        let state = h.store.state.lock().unwrap();
        // Gap events applied exactly once each; checkpoint at head - lag.
        assert_eq!(state.transfers.len(), 5);
        assert_eq!(state.checkpoint, Some(18));
        assert_eq!(h.bus.published.lock().unwrap().len(), 5);
        assert_eq!(h.health.snapshot().last_applied_block, 18);
    }
}
