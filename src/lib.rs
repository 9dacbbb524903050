pub mod abis;
pub mod config;
pub mod db;
pub mod gateway;
pub mod pubsub;
pub mod sync;
pub mod utils;

pub use config::Settings;
pub use db::PostgresClient;
pub use gateway::RpcGateway;
pub use pubsub::RedpandaPublisher;
pub use sync::SyncOrchestrator;
