use config::{Config, ConfigError, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// PostgreSQL holds all projected records: transfers, bounties, parked
/// claims, and the sync checkpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Chain gateway configuration.
///
/// The indexer runs against exactly one chain; deploy one instance per
/// configured chain. `rpc_url` serves height and range queries over HTTP,
/// `ws_url` serves the live log subscription.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    pub chain_id: u64,
    pub rpc_url: String,
    pub ws_url: String,
    /// TipJar contract emitting TransferSent.
    pub tip_jar_address: String,
    /// BountyBoard contract emitting BountyOpened/BountyClaimed.
    pub bounty_board_address: String,
    /// First block to index, typically the contract deployment block.
    /// Only consulted on the very first run; the persisted checkpoint wins
    /// afterwards.
    #[serde(default = "default_start_block")]
    pub start_block: u64,
    /// Trailing blocks withheld from backfill to reduce reorg exposure.
    #[serde(default = "default_confirmation_lag")]
    pub confirmation_lag: u64,
    /// Blocks per backfill window. Bounds memory and the size of a retry
    /// unit.
    #[serde(default = "default_block_window")]
    pub block_window: u64,
    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_start_block() -> u64 {
    1
}

fn default_confirmation_lag() -> u64 {
    6
}

fn default_block_window() -> u64 {
    2_000
}

fn default_reconnect_initial_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

/// Orchestrator tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// Interval between reconcile passes while the live subscription is up.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval_secs(),
        }
    }
}

fn default_reconcile_interval_secs() -> u64 {
    60
}

/// Redpanda (Kafka-compatible) pub/sub configuration.
///
/// When enabled, every freshly applied event is republished as JSON to
/// `{topic_prefix}.events.{chain_id}` for connected consumers.
#[derive(Debug, Deserialize, Clone)]
pub struct RedpandaSettings {
    /// Enable/disable event publishing
    #[serde(default)]
    pub enabled: bool,
    /// Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[serde(default = "default_redpanda_brokers")]
    pub brokers: String,
    /// Topic name prefix (topic: {prefix}.events.{chain_id})
    #[serde(default = "default_redpanda_topic_prefix")]
    pub topic_prefix: String,
}

fn default_redpanda_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_redpanda_topic_prefix() -> String {
    "patron".to_string()
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup. A missing or unparsable contract
/// address is a startup error; the process exits non-zero rather than run
/// with a partial filter.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub chain: ChainSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub redpanda: Option<RedpandaSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
