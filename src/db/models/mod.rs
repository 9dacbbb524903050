mod bounty;
mod checkpoint;
mod transfer;

pub use bounty::{BountyRecord, BountyStatus, PendingClaim};
pub use checkpoint::SyncCheckpoint;
pub use transfer::TransferRecord;
