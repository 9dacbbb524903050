//! Pub/Sub fan-out for newly persisted chain events.
//!
//! Consumers subscribe to a named channel and receive JSON payloads.
//! Delivery is at-least-once; an event is only ever published after it is
//! durably persisted, and consumers de-duplicate by `(tx_hash, log_index)`
//! when they need exactly-once semantics.

mod redpanda;

pub use redpanda::RedpandaPublisher;

use async_trait::async_trait;

use crate::sync::DomainEvent;

/// Fan-out of already-persisted domain events to connected consumers.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn publish(&self, event: &DomainEvent);
}

/// Bus used when publishing is disabled in configuration. Keeps the apply
/// path identical either way.
pub struct NoopBus;

#[async_trait]
impl NotificationBus for NoopBus {
    async fn publish(&self, event: &DomainEvent) {
        log::debug!("Publishing disabled, dropping {} notification", event.kind());
    }
}
