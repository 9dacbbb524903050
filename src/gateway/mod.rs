//! Boundary to the chain node.

mod rpc;

pub use rpc::RpcGateway;

use alloy::primitives::{Address, LogData, B256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// A single emitted log entry, uniquely positioned by
/// `(block_number, log_index)`.
#[derive(Debug, Clone)]
pub struct RawLogEntry {
    pub address: Address,
    pub block_number: u64,
    /// Unix timestamp of the containing block, resolved by the gateway.
    pub block_timestamp: u64,
    pub log_index: u64,
    pub tx_hash: B256,
    pub data: LogData,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure. Retryable with backoff, without limit.
    #[error("transient gateway error: {0}")]
    Transient(String),
    /// The caller asked for an impossible range. Fatal for that call.
    #[error("invalid block range {from}..={to}")]
    InvalidRange { from: u64, to: u64 },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Chain data source: current height, historical range queries, and a live
/// log subscription.
///
/// `subscribe` is at-least-once: duplicates, and gaps on reconnect, are
/// expected. Downstream applies are idempotent, so neither needs handling
/// here.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn current_height(&self) -> Result<u64, GatewayError>;

    /// Matching log entries in `from..=to`, ordered by
    /// `(block_number, log_index)` ascending.
    async fn query_range(&self, from: u64, to: u64) -> Result<Vec<RawLogEntry>, GatewayError>;

    /// Open a live stream of matching log entries from the current tip.
    /// The stream ends when the underlying connection drops; callers
    /// reconnect by calling `subscribe` again.
    async fn subscribe(&self) -> Result<BoxStream<'static, RawLogEntry>, GatewayError>;
}
