//! Chain-to-store synchronization: decoding, idempotent apply, backfill
//! reconciliation, live subscription, and supervision.

mod apply;
pub mod backfill;
pub mod decoder;
pub mod health;
pub mod live;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use apply::{ApplyStatus, EventApplier};
pub use backfill::BackfillReconciler;
pub use decoder::{decode, DecodeError, DomainEvent, EventKey};
pub use health::{HealthSnapshot, SyncHealth};
pub use live::LiveSubscriber;
pub use orchestrator::SyncOrchestrator;
