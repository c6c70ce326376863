use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{Acknowledger, Delivery, QueueSource};
use crate::error::RelayError;

// ============================================================================
// Kafka Queue Binding
// ============================================================================
//
// Adapts one subscribed topic to the dispatcher's QueueSource contract using
// manual offset commits:
//
//   ack                  -> commit offset + 1
//   nack(requeue = true) -> seek back to the offset, do not commit; the next
//                           poll redelivers
//   nack(requeue = false)-> commit offset + 1 (discard)
//
// At-least-once by construction: a crash between handling and commit means
// redelivery, which is why handlers must be idempotent.
//
// ============================================================================

pub struct KafkaQueueSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaQueueSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, RelayError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()?;

        consumer.subscribe(&[topic])?;

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl QueueSource for KafkaQueueSource {
    async fn recv(&mut self) -> Result<Option<Delivery>, RelayError> {
        let message = self.consumer.recv().await?;
        let body = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
        let ack = KafkaAck {
            consumer: self.consumer.clone(),
            topic: self.topic.clone(),
            partition: message.partition(),
            offset: message.offset(),
        };
        Ok(Some(Delivery::new(body, Box::new(ack))))
    }
}

struct KafkaAck {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl KafkaAck {
    fn commit_next(&self) -> Result<(), RelayError> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for KafkaAck {
    async fn ack(self: Box<Self>) -> Result<(), RelayError> {
        self.commit_next()
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), RelayError> {
        if requeue {
            self.consumer.seek(
                &self.topic,
                self.partition,
                Offset::Offset(self.offset),
                Duration::from_secs(5),
            )?;
            Ok(())
        } else {
            self.commit_next()
        }
    }
}
