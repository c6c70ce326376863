use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

use crate::error::RelayError;
use crate::messaging::events::OrderCreated;
use crate::utils::{Breaker, BreakerConfig, BreakerError};

/// Hands the created event to the broker for downstream processing.
#[async_trait]
pub trait CreatedEventPublisher: Send + Sync {
    async fn publish_created(&self, event: &OrderCreated) -> Result<(), RelayError>;
}

pub struct KafkaCreatedPublisher {
    producer: FutureProducer,
    topic: String,
    breaker: Breaker,
}

impl KafkaCreatedPublisher {
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, RelayError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.into(),
            breaker: Breaker::new(BreakerConfig {
                failure_threshold: 5,
                cooldown: Duration::from_secs(30),
            }),
        })
    }
}

#[async_trait]
impl CreatedEventPublisher for KafkaCreatedPublisher {
    async fn publish_created(&self, event: &OrderCreated) -> Result<(), RelayError> {
        let key = event.order_id.to_string();
        let payload = serde_json::to_string(event)
            .map_err(|e| RelayError::transient(anyhow::Error::new(e).context("encode event")))?;

        let result = self
            .breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
                self.producer
                    .send(record, Duration::from_secs(5))
                    .await
                    .map_err(|(err, _)| err)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    topic = %self.topic,
                    order_id = %event.order_id,
                    "published order.created"
                );
                Ok(())
            }
            Err(BreakerError::Open) => {
                tracing::error!(topic = %self.topic, "broker circuit open, not publishing");
                Err(RelayError::transient(anyhow::anyhow!(
                    "broker circuit open for topic {}",
                    self.topic
                )))
            }
            Err(BreakerError::Inner(err)) => {
                tracing::error!(
                    topic = %self.topic,
                    order_id = %event.order_id,
                    error = %err,
                    "failed to publish order.created"
                );
                Err(err.into())
            }
        }
    }
}
