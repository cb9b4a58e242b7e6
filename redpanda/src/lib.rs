//! Redpanda message-log implementation for Chirp.
//!
//! This crate implements the [`MessageLog`] contract from `chirp-core`
//! on top of rdkafka, so any Kafka-compatible broker works (Redpanda,
//! Apache Kafka, MSK, ...).
//!
//! # Partitioning
//!
//! Every record is produced with the aggregate id as its key. Kafka's
//! default partitioner is a deterministic hash of the key, so all
//! records for one aggregate land on one partition and are consumed in
//! publish order, which is the ordering guarantee the timeline
//! materializer relies on. Across keys no order is guaranteed.
//!
//! # Delivery
//!
//! At-least-once: the producer may retry and the consumer group may
//! re-deliver after a rebalance. The downstream handler is idempotent,
//! so duplicates are harmless.
//!
//! # Example
//!
//! ```no_run
//! use chirp_redpanda::RedpandaLog;
//! use chirp_core::log::MessageLog;
//! use chirp_core::event::{LogRecord, RecordHeaders};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = RedpandaLog::new("localhost:9092")?;
//!
//! let record = LogRecord {
//!     key: "550e8400-e29b-41d4-a716-446655440000".to_string(),
//!     payload: r#"{"content":"hello"}"#.to_string(),
//!     headers: RecordHeaders {
//!         event_type: "POST_CREATED".to_string(),
//!         event_id: "...".to_string(),
//!         request_id: None,
//!     },
//! };
//! log.publish("timeline-events", &record).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chirp_core::error::LogError;
use chirp_core::event::{LogRecord, RecordHeaders};
use chirp_core::log::{MessageLog, RecordStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

/// Header keys on the wire.
const HEADER_EVENT_TYPE: &str = "eventType";
const HEADER_EVENT_ID: &str = "eventId";
const HEADER_REQUEST_ID: &str = "requestId";

/// Kafka-compatible message log.
pub struct RedpandaLog {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
}

impl RedpandaLog {
    /// Connect with default producer settings (leader acks, 5 s send
    /// timeout).
    ///
    /// # Errors
    ///
    /// [`LogError::ConnectionFailed`] when the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, LogError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a log connection.
    #[must_use]
    pub fn builder() -> RedpandaLogBuilder {
        RedpandaLogBuilder::default()
    }
}

/// Builder for [`RedpandaLog`].
#[derive(Default)]
pub struct RedpandaLogBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaLogBuilder {
    /// Comma-separated broker addresses (e.g. `localhost:9092`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgement mode: `"0"`, `"1"` (default) or
    /// `"all"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Producer send timeout (default 5 seconds).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the log.
    ///
    /// # Errors
    ///
    /// [`LogError::ConnectionFailed`] when brokers are missing or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaLog, LogError> {
        let brokers = self
            .brokers
            .ok_or_else(|| LogError::ConnectionFailed("brokers not configured".to_string()))?;

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", self.producer_acks.as_deref().unwrap_or("1"))
            .create()
            .map_err(|e| LogError::ConnectionFailed(format!("failed to create producer: {e}")))?;

        tracing::info!(brokers = %brokers, "Redpanda producer created");

        Ok(RedpandaLog {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
        })
    }
}

#[async_trait]
impl MessageLog for RedpandaLog {
    async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), LogError> {
        let mut headers = OwnedHeaders::new()
            .insert(Header {
                key: HEADER_EVENT_TYPE,
                value: Some(record.headers.event_type.as_bytes()),
            })
            .insert(Header {
                key: HEADER_EVENT_ID,
                value: Some(record.headers.event_id.as_bytes()),
            });
        if let Some(request_id) = &record.headers.request_id {
            headers = headers.insert(Header {
                key: HEADER_REQUEST_ID,
                value: Some(request_id.as_bytes()),
            });
        }

        let kafka_record = FutureRecord::to(topic)
            .key(&record.key)
            .payload(&record.payload)
            .headers(headers);

        match self
            .producer
            .send(kafka_record, Timeout::After(self.timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %topic,
                    partition,
                    offset,
                    event_type = %record.headers.event_type,
                    key = %record.key,
                    "Record published"
                );
                Ok(())
            }
            Err((kafka_error, _)) => {
                tracing::error!(topic = %topic, error = %kafka_error, "Failed to publish record");
                Err(LogError::PublishFailed {
                    topic: topic.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<RecordStream, LogError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| LogError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: format!("failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| LogError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: format!("failed to subscribe: {e}"),
            })?;

        tracing::info!(topic = %topic, consumer_group = %group, "Subscribed to topic");

        // Bridge the rdkafka stream into a channel: the consumer stays
        // alive inside the forwarding task for as long as the receiver
        // is polled.
        let (tx, rx) = tokio::sync::mpsc::channel(100);

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut stream = consumer.stream();
            while let Some(message) = stream.next().await {
                let record = message
                    .map_err(|e| LogError::Transport(format!("failed to receive message: {e}")))
                    .and_then(|m| decode_message(&m));

                if tx.send(record).await.is_err() {
                    break; // Receiver dropped.
                }
            }

            tracing::debug!("Consumer forwarding task exiting");
        });

        let stream = async_stream::stream! {
            let mut rx = rx;
            while let Some(result) = rx.recv().await {
                yield result;
            }
        };

        Ok(Box::pin(stream) as RecordStream)
    }
}

/// Decode one Kafka message into a [`LogRecord`].
fn decode_message(message: &impl Message) -> Result<LogRecord, LogError> {
    let key = message
        .key()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .ok_or_else(|| LogError::Deserialization("message has no key".to_string()))?;

    let payload = message
        .payload()
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .ok_or_else(|| LogError::Deserialization("message has no payload".to_string()))?;

    let mut event_type = None;
    let mut event_id = None;
    let mut request_id = None;
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            let value = header
                .value
                .map(|v| String::from_utf8_lossy(v).into_owned());
            match header.key {
                HEADER_EVENT_TYPE => event_type = value,
                HEADER_EVENT_ID => event_id = value,
                HEADER_REQUEST_ID => request_id = value,
                _ => {}
            }
        }
    }

    Ok(LogRecord {
        key,
        payload,
        headers: RecordHeaders {
            event_type: event_type
                .ok_or_else(|| LogError::Deserialization("missing eventType header".to_string()))?,
            event_id: event_id.unwrap_or_default(),
            request_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_log_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaLog>();
        assert_sync::<RedpandaLog>();
    }

    #[test]
    fn builder_requires_brokers() {
        assert!(matches!(
            RedpandaLog::builder().build(),
            Err(LogError::ConnectionFailed(_))
        ));
    }
}
