//! In-memory fakes for exercising the sync pipeline without a node or a
//! database.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::Notify;

use crate::abis::{BountyClaimed, BountyOpened, TransferSent};
use crate::config::ChainSettings;
use crate::db::models::{BountyRecord, BountyStatus, PendingClaim, SyncCheckpoint, TransferRecord};
use crate::db::{ApplyOutcome, ClaimOutcome, EventStore};
use crate::gateway::{ChainGateway, GatewayError, RawLogEntry};
use crate::pubsub::NotificationBus;
use crate::sync::apply::EventApplier;
use crate::sync::backfill::BackfillReconciler;
use crate::sync::decoder::DomainEvent;
use crate::sync::health::SyncHealth;
use crate::sync::live::LiveSubscriber;

pub const CHAIN_ID: i64 = 31337;

pub fn tx(n: u8) -> B256 {
    B256::repeat_byte(n)
}

fn entry(block: u64, log_index: u64, tx_hash: B256, data: alloy::primitives::LogData) -> RawLogEntry {
    RawLogEntry {
        address: Address::repeat_byte(0x11),
        block_number: block,
        block_timestamp: 1_700_000_000 + block,
        log_index,
        tx_hash,
        data,
    }
}

pub fn transfer_entry(block: u64, log_index: u64, tx_hash: B256, amount_tokens: u64) -> RawLogEntry {
    let event = TransferSent {
        sender: Address::repeat_byte(0xaa),
        recipient: Address::repeat_byte(0xbb),
        amount: U256::from(amount_tokens) * U256::from(10u64).pow(U256::from(18u64)),
        message: "gg".to_string(),
    };
    entry(block, log_index, tx_hash, event.encode_log_data())
}

pub fn bounty_opened_entry(block: u64, log_index: u64, tx_hash: B256, bounty_id: &str) -> RawLogEntry {
    let event = BountyOpened {
        creator: Address::repeat_byte(0xcc),
        bountyId: bounty_id.to_string(),
        title: format!("Bounty {bounty_id}"),
        description: "Test bounty".to_string(),
        amount: U256::from(100u64) * U256::from(10u64).pow(U256::from(18u64)),
        deadline: U256::from(1_800_000_000u64),
    };
    entry(block, log_index, tx_hash, event.encode_log_data())
}

pub fn bounty_claimed_entry(
    block: u64,
    log_index: u64,
    tx_hash: B256,
    bounty_id: &str,
    content_uri: &str,
) -> RawLogEntry {
    let event = BountyClaimed {
        claimer: Address::repeat_byte(0xdd),
        bountyId: bounty_id.to_string(),
        contentUri: content_uri.to_string(),
    };
    entry(block, log_index, tx_hash, event.encode_log_data())
}

/// Gateway over a fixed script of log entries.
///
/// `entries` backs `query_range`; `sessions` backs `subscribe`, one queued
/// session per call. A session flagged `stay_open` never terminates its
/// stream, modelling a healthy subscription; otherwise the stream ends
/// after its entries, modelling an outage.
#[derive(Default)]
pub struct ScriptedGateway {
    head: AtomicU64,
    entries: Mutex<Vec<RawLogEntry>>,
    sessions: Mutex<VecDeque<(Vec<RawLogEntry>, bool)>>,
}

impl ScriptedGateway {
    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push_entry(&self, entry: RawLogEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn push_session(&self, entries: Vec<RawLogEntry>, stay_open: bool) {
        self.sessions.lock().unwrap().push_back((entries, stay_open));
    }
}

#[async_trait]
impl ChainGateway for ScriptedGateway {
    async fn current_height(&self) -> Result<u64, GatewayError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn query_range(&self, from: u64, to: u64) -> Result<Vec<RawLogEntry>, GatewayError> {
        if from > to {
            return Err(GatewayError::InvalidRange { from, to });
        }
        let mut matching: Vec<RawLogEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block_number >= from && e.block_number <= to)
            .cloned()
            .collect();
        matching.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(matching)
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, RawLogEntry>, GatewayError> {
        let session = self.sessions.lock().unwrap().pop_front();
        let (entries, stay_open) = match session {
            Some(session) => session,
            // No scripted session left: an idle, healthy subscription.
            None => (Vec::new(), true),
        };

        let stream = futures::stream::iter(entries);
        if stay_open {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}

/// Store that records every applied write in order.
#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<MemoryState>,
}

#[derive(Default)]
pub struct MemoryState {
    pub transfers: HashMap<(String, i64), TransferRecord>,
    pub bounties: HashMap<String, BountyRecord>,
    pub pending: Vec<PendingClaim>,
    pub checkpoint: Option<i64>,
    /// `(tx_hash, log_index)` of every write that reported `Applied`.
    pub apply_order: Vec<(String, i64)>,
    pub fail_transfers: bool,
}

impl MemoryStore {
    pub fn fail_transfers(&self, fail: bool) {
        self.state.lock().unwrap().fail_transfers = fail;
    }

    pub async fn set_checkpoint(&self, block: i64) {
        self.set_sync_checkpoint(CHAIN_ID, block).await.unwrap();
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn upsert_transfer(&self, record: &TransferRecord) -> anyhow::Result<ApplyOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.fail_transfers {
            anyhow::bail!("injected store failure");
        }
        let key = (record.tx_hash.clone(), record.log_index);
        if state.transfers.contains_key(&key) {
            return Ok(ApplyOutcome::AlreadyApplied);
        }
        state.apply_order.push(key.clone());
        state.transfers.insert(key, record.clone());
        Ok(ApplyOutcome::Applied)
    }

    async fn upsert_bounty_opened(&self, record: &BountyRecord) -> anyhow::Result<ApplyOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.bounties.contains_key(&record.bounty_id) {
            return Ok(ApplyOutcome::AlreadyApplied);
        }
        state
            .apply_order
            .push((record.open_tx_hash.clone(), record.open_log_index));
        state.bounties.insert(record.bounty_id.clone(), record.clone());
        Ok(ApplyOutcome::Applied)
    }

    async fn apply_bounty_claim(
        &self,
        bounty_id: &str,
        claimer: &str,
        content_uri: &str,
        tx_hash: &str,
        log_index: i64,
    ) -> anyhow::Result<ClaimOutcome> {
        let mut state = self.state.lock().unwrap();
        let Some(bounty) = state.bounties.get_mut(bounty_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if bounty.status == BountyStatus::Claimed {
            return Ok(ClaimOutcome::AlreadyApplied);
        }
        bounty.status = BountyStatus::Claimed;
        bounty.claimer = Some(claimer.to_string());
        bounty.content_uri = Some(content_uri.to_string());
        bounty.claim_tx_hash = Some(tx_hash.to_string());
        bounty.claim_log_index = Some(log_index);
        state.apply_order.push((tx_hash.to_string(), log_index));
        Ok(ClaimOutcome::Applied)
    }

    async fn get_sync_checkpoint(&self, chain_id: i64) -> anyhow::Result<Option<SyncCheckpoint>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .checkpoint
            .map(|block| SyncCheckpoint::new(chain_id, block)))
    }

    async fn set_sync_checkpoint(
        &self,
        _chain_id: i64,
        last_applied_block: i64,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.checkpoint = Some(match state.checkpoint {
            Some(existing) => existing.max(last_applied_block),
            None => last_applied_block,
        });
        Ok(())
    }

    async fn record_pending_claim(&self, claim: &PendingClaim) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let exists = state
            .pending
            .iter()
            .any(|c| c.tx_hash == claim.tx_hash && c.log_index == claim.log_index);
        if !exists {
            state.pending.push(claim.clone());
        }
        Ok(())
    }

    async fn pending_claims(&self, chain_id: i64) -> anyhow::Result<Vec<PendingClaim>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pending
            .iter()
            .filter(|c| c.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn resolve_pending_claim(&self, tx_hash: &str, log_index: i64) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .pending
            .retain(|c| !(c.tx_hash == tx_hash && c.log_index == log_index));
        Ok(())
    }
}

/// Bus that records published events.
#[derive(Default)]
pub struct RecordingBus {
    pub published: Mutex<Vec<DomainEvent>>,
}

#[async_trait]
impl NotificationBus for RecordingBus {
    async fn publish(&self, event: &DomainEvent) {
        self.published.lock().unwrap().push(event.clone());
    }
}

/// Wires the fakes together the way `main` wires the real components.
pub struct Harness {
    pub gateway: Arc<ScriptedGateway>,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<RecordingBus>,
    pub health: Arc<SyncHealth>,
    pub reconnected: Arc<Notify>,
    pub applier: Arc<EventApplier<MemoryStore>>,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = Arc::new(ScriptedGateway::default());
        let store = Arc::new(MemoryStore::default());
        let bus = Arc::new(RecordingBus::default());
        let health = Arc::new(SyncHealth::default());
        let applier = Arc::new(EventApplier::new(
            CHAIN_ID,
            store.clone(),
            bus.clone(),
            health.clone(),
        ));
        Self {
            gateway,
            store,
            bus,
            health,
            reconnected: Arc::new(Notify::new()),
            applier,
        }
    }

    fn chain_settings(confirmation_lag: u64, block_window: u64) -> ChainSettings {
        ChainSettings {
            chain_id: CHAIN_ID as u64,
            rpc_url: "http://localhost:8545".to_string(),
            ws_url: "ws://localhost:8546".to_string(),
            tip_jar_address: "0x1111111111111111111111111111111111111111".to_string(),
            bounty_board_address: "0x2222222222222222222222222222222222222222".to_string(),
            start_block: 1,
            confirmation_lag,
            block_window,
            reconnect_initial_delay_ms: 10,
            reconnect_max_delay_ms: 50,
        }
    }

    pub fn backfill(
        &self,
        confirmation_lag: u64,
        block_window: u64,
    ) -> BackfillReconciler<ScriptedGateway, MemoryStore> {
        BackfillReconciler::new(
            CHAIN_ID,
            self.gateway.clone(),
            self.store.clone(),
            self.applier.clone(),
            self.health.clone(),
            &Self::chain_settings(confirmation_lag, block_window),
        )
    }

    pub fn live(&self) -> LiveSubscriber<ScriptedGateway, MemoryStore> {
        LiveSubscriber::new(
            self.gateway.clone(),
            self.applier.clone(),
            self.reconnected.clone(),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
    }
}
