mod config;

pub use config::{ChainSettings, PostgresSettings, RedpandaSettings, Settings, SyncSettings};
