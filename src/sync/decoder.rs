//! Raw log decoding into the closed set of domain events.

use std::fmt;

use alloy::sol_types::SolEvent;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::abis::{BountyClaimed, BountyOpened, TransferSent};
use crate::gateway::RawLogEntry;
use crate::utils::{base_units_to_decimal, hex_encode, NATIVE_DECIMALS};

/// Globally unique position of a log entry: the idempotency key for every
/// domain event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub tx_hash: String,
    pub log_index: u64,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.log_index)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The log does not match any event this indexer cares about. Skipped,
    /// never fatal for a batch.
    #[error("unrecognized log shape")]
    Unrecognized,
    /// The signature topic matched but the payload failed ABI decoding.
    #[error("malformed {event} log: {source}")]
    Malformed {
        event: &'static str,
        source: alloy::sol_types::Error,
    },
}

/// A confirmed on-chain event in domain terms. Immutable once constructed.
///
/// Serialized form (serde-tagged JSON) is the wire format on the
/// notification bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    TransferSent {
        sender: String,
        recipient: String,
        amount: BigDecimal,
        message: Option<String>,
        occurred_at: DateTime<Utc>,
        tx_hash: String,
        log_index: u64,
    },
    BountyOpened {
        bounty_id: String,
        creator: String,
        title: String,
        description: String,
        amount: BigDecimal,
        deadline: DateTime<Utc>,
        tx_hash: String,
        log_index: u64,
    },
    BountyClaimed {
        bounty_id: String,
        claimer: String,
        content_uri: String,
        tx_hash: String,
        log_index: u64,
    },
}

impl DomainEvent {
    pub fn key(&self) -> EventKey {
        let (tx_hash, log_index) = match self {
            DomainEvent::TransferSent {
                tx_hash, log_index, ..
            }
            | DomainEvent::BountyOpened {
                tx_hash, log_index, ..
            }
            | DomainEvent::BountyClaimed {
                tx_hash, log_index, ..
            } => (tx_hash, *log_index),
        };
        EventKey {
            tx_hash: tx_hash.clone(),
            log_index,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TransferSent { .. } => "TransferSent",
            DomainEvent::BountyOpened { .. } => "BountyOpened",
            DomainEvent::BountyClaimed { .. } => "BountyClaimed",
        }
    }
}

fn timestamp_from_secs(secs: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs as i64, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Map a raw log entry to a domain event.
///
/// Pure: no I/O, no side effects. Amount fields are converted from base
/// units exactly; see `base_units_to_decimal`.
pub fn decode(entry: &RawLogEntry) -> Result<DomainEvent, DecodeError> {
    let Some(topic0) = entry.data.topics().first() else {
        return Err(DecodeError::Unrecognized);
    };

    let tx_hash = hex_encode(entry.tx_hash.as_slice());

    match *topic0 {
        t if t == TransferSent::SIGNATURE_HASH => {
            let event = TransferSent::decode_log_data(&entry.data).map_err(|source| {
                DecodeError::Malformed {
                    event: "TransferSent",
                    source,
                }
            })?;
            let message = if event.message.is_empty() {
                None
            } else {
                Some(event.message)
            };
            Ok(DomainEvent::TransferSent {
                sender: hex_encode(event.sender.as_slice()),
                recipient: hex_encode(event.recipient.as_slice()),
                amount: base_units_to_decimal(event.amount, NATIVE_DECIMALS),
                message,
                occurred_at: timestamp_from_secs(entry.block_timestamp),
                tx_hash,
                log_index: entry.log_index,
            })
        },
        t if t == BountyOpened::SIGNATURE_HASH => {
            let event = BountyOpened::decode_log_data(&entry.data).map_err(|source| {
                DecodeError::Malformed {
                    event: "BountyOpened",
                    source,
                }
            })?;
            Ok(DomainEvent::BountyOpened {
                bounty_id: event.bountyId,
                creator: hex_encode(event.creator.as_slice()),
                title: event.title,
                description: event.description,
                amount: base_units_to_decimal(event.amount, NATIVE_DECIMALS),
                deadline: timestamp_from_secs(event.deadline.saturating_to::<u64>()),
                tx_hash,
                log_index: entry.log_index,
            })
        },
        t if t == BountyClaimed::SIGNATURE_HASH => {
            let event = BountyClaimed::decode_log_data(&entry.data).map_err(|source| {
                DecodeError::Malformed {
                    event: "BountyClaimed",
                    source,
                }
            })?;
            Ok(DomainEvent::BountyClaimed {
                bounty_id: event.bountyId,
                claimer: hex_encode(event.claimer.as_slice()),
                content_uri: event.contentUri,
                tx_hash,
                log_index: entry.log_index,
            })
        },
        _ => Err(DecodeError::Unrecognized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, LogData, B256, U256};

    fn entry_with(data: LogData) -> RawLogEntry {
        RawLogEntry {
            address: Address::repeat_byte(0x11),
            block_number: 100,
            block_timestamp: 1_700_000_000,
            log_index: 3,
            tx_hash: B256::repeat_byte(0x01),
            data,
        }
    }

    #[test]
    fn decodes_transfer_sent() {
        let event = TransferSent {
            sender: Address::repeat_byte(0xaa),
            recipient: Address::repeat_byte(0xbb),
            amount: U256::from(10u64).pow(U256::from(19u64)),
            message: "gg".to_string(),
        };
        let decoded = decode(&entry_with(event.encode_log_data())).unwrap();

        match decoded {
            DomainEvent::TransferSent {
                sender,
                recipient,
                amount,
                message,
                occurred_at,
                tx_hash,
                log_index,
            } => {
                assert_eq!(sender, hex_encode(Address::repeat_byte(0xaa).as_slice()));
                assert_eq!(recipient, hex_encode(Address::repeat_byte(0xbb).as_slice()));
                assert_eq!(amount, BigDecimal::from(10));
                assert_eq!(message.as_deref(), Some("gg"));
                assert_eq!(occurred_at.timestamp(), 1_700_000_000);
                assert_eq!(tx_hash, hex_encode(B256::repeat_byte(0x01).as_slice()));
                assert_eq!(log_index, 3);
            },
            other => panic!("Expected TransferSent, got {:?}", other),
        }
    }

    #[test]
    fn empty_message_becomes_none() {
        let event = TransferSent {
            sender: Address::repeat_byte(0xaa),
            recipient: Address::repeat_byte(0xbb),
            amount: U256::from(1u64),
            message: String::new(),
        };
        let decoded = decode(&entry_with(event.encode_log_data())).unwrap();
        match decoded {
            DomainEvent::TransferSent { message, .. } => assert!(message.is_none()),
            other => panic!("Expected TransferSent, got {:?}", other),
        }
    }

    #[test]
    fn decodes_bounty_lifecycle_pair() {
        let opened = BountyOpened {
            creator: Address::repeat_byte(0xcc),
            bountyId: "b1".to_string(),
            title: "Fix the stage lights".to_string(),
            description: "See the venue notes".to_string(),
            amount: U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64)),
            deadline: U256::from(1_800_000_000u64),
        };
        let decoded = decode(&entry_with(opened.encode_log_data())).unwrap();
        match decoded {
            DomainEvent::BountyOpened {
                bounty_id,
                amount,
                deadline,
                ..
            } => {
                assert_eq!(bounty_id, "b1");
                assert_eq!(amount, BigDecimal::from(100));
                assert_eq!(deadline.timestamp(), 1_800_000_000);
            },
            other => panic!("Expected BountyOpened, got {:?}", other),
        }

        let claimed = BountyClaimed {
            claimer: Address::repeat_byte(0xdd),
            bountyId: "b1".to_string(),
            contentUri: "ipfs://x".to_string(),
        };
        let decoded = decode(&entry_with(claimed.encode_log_data())).unwrap();
        match decoded {
            DomainEvent::BountyClaimed {
                bounty_id,
                content_uri,
                ..
            } => {
                assert_eq!(bounty_id, "b1");
                assert_eq!(content_uri, "ipfs://x");
            },
            other => panic!("Expected BountyClaimed, got {:?}", other),
        }
    }

    #[test]
    fn unknown_topic_is_unrecognized() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Bytes::new());
        assert!(matches!(
            decode(&entry_with(data)),
            Err(DecodeError::Unrecognized)
        ));
    }

    #[test]
    fn topicless_log_is_unrecognized() {
        let data = LogData::new_unchecked(vec![], Bytes::new());
        assert!(matches!(
            decode(&entry_with(data)),
            Err(DecodeError::Unrecognized)
        ));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        // Right signature topic, but the indexed topics and body are gone.
        let data = LogData::new_unchecked(vec![TransferSent::SIGNATURE_HASH], Bytes::new());
        assert!(matches!(
            decode(&entry_with(data)),
            Err(DecodeError::Malformed { event: "TransferSent", .. })
        ));
    }
}
