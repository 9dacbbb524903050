use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Projected tip transfer (PostgreSQL).
///
/// Append-only: one row per TransferSent log entry, keyed by
/// `(tx_hash, log_index)`. Re-applying the same entry is a no-op.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecord {
    pub chain_id: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub sender: String,
    pub recipient: String,
    /// Exact amount in native-token units.
    pub amount: BigDecimal,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
