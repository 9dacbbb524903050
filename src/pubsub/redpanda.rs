//! Redpanda (Kafka-compatible) publisher implementation.

use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crate::config::RedpandaSettings;
use crate::pubsub::NotificationBus;
use crate::sync::DomainEvent;

/// Redpanda publisher for freshly applied domain events.
///
/// Publishes each event as JSON to `{prefix}.events.{chain_id}`, keyed by
/// transaction hash so consumers can partition by origin.
pub struct RedpandaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl RedpandaPublisher {
    /// Create a new Redpanda publisher.
    ///
    /// Returns None if Redpanda is disabled in settings or connection fails.
    pub fn new(settings: &RedpandaSettings, chain_id: u64) -> Option<Self> {
        if !settings.enabled {
            info!("Redpanda publishing is disabled");
            return None;
        }

        info!("Connecting to Redpanda brokers: {}", settings.brokers);

        let producer: FutureProducer = match ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .set("linger.ms", "5")
            .create()
        {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to create Redpanda producer: {}", e);
                return None;
            },
        };

        let topic = format!("{}.events.{}", settings.topic_prefix, chain_id);
        info!("Redpanda publisher initialized with topic: {}", topic);

        Some(Self { producer, topic })
    }

    /// Flush any pending messages (call on shutdown).
    pub fn flush(&self) {
        self.producer.flush(Duration::from_secs(5)).ok();
    }
}

#[async_trait]
impl NotificationBus for RedpandaPublisher {
    /// Publish a single event.
    ///
    /// Best-effort: a failed send is logged, not retried here. Missed
    /// consumers catch up from the store; the indexer never blocks on the
    /// broker.
    async fn publish(&self, event: &DomainEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.kind(), e);
                return;
            },
        };

        let key = event.key().to_string();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(record, Duration::from_millis(100)).await {
            Ok(_) => {},
            Err((e, _)) => {
                warn!("Failed to publish {} to {}: {}", key, self.topic, e);
            },
        }
    }
}

impl Drop for RedpandaPublisher {
    fn drop(&mut self) {
        self.flush();
    }
}
