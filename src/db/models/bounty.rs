use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of a bounty projection.
///
/// The only permitted transition is `Open -> Claimed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BountyStatus {
    Open,
    Claimed,
}

impl BountyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BountyStatus::Open => "open",
            BountyStatus::Claimed => "claimed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(BountyStatus::Open),
            "claimed" => Some(BountyStatus::Claimed),
            _ => None,
        }
    }
}

/// Projected bounty (PostgreSQL).
///
/// Created by BountyOpened (unique `bounty_id`), mutated in place by
/// BountyClaimed. The claim columns stay NULL until the bounty is claimed.
#[derive(Debug, Clone, Serialize)]
pub struct BountyRecord {
    pub chain_id: i64,
    pub bounty_id: String,
    pub creator: String,
    pub title: String,
    pub description: String,
    /// Exact reward amount in native-token units.
    pub amount: BigDecimal,
    pub deadline: DateTime<Utc>,
    pub status: BountyStatus,
    pub claimer: Option<String>,
    pub content_uri: Option<String>,
    pub block_number: i64,
    pub open_tx_hash: String,
    pub open_log_index: i64,
    pub claim_tx_hash: Option<String>,
    pub claim_log_index: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl BountyRecord {
    /// Build the initial projection for a BountyOpened event.
    #[allow(clippy::too_many_arguments)]
    pub fn opened(
        chain_id: i64,
        bounty_id: String,
        creator: String,
        title: String,
        description: String,
        amount: BigDecimal,
        deadline: DateTime<Utc>,
        block_number: i64,
        open_tx_hash: String,
        open_log_index: i64,
    ) -> Self {
        Self {
            chain_id,
            bounty_id,
            creator,
            title,
            description,
            amount,
            deadline,
            status: BountyStatus::Open,
            claimer: None,
            content_uri: None,
            block_number,
            open_tx_hash,
            open_log_index,
            claim_tx_hash: None,
            claim_log_index: None,
            updated_at: Utc::now(),
        }
    }
}

/// A BountyClaimed observed before its BountyOpened row exists.
///
/// Parked durably so the retry survives process restarts; the next
/// reconcile pass re-attempts it and resolves the row once applied.
#[derive(Debug, Clone)]
pub struct PendingClaim {
    pub chain_id: i64,
    pub bounty_id: String,
    pub claimer: String,
    pub content_uri: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub first_seen_at: DateTime<Utc>,
}
