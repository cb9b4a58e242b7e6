//! Message-log contract.
//!
//! The log sits between the outbox dispatcher (producer) and the
//! timeline materializer (consumer). Delivery is at-least-once; the
//! partitioner must be a deterministic function of the record key so
//! that all records for one aggregate land on one partition and are
//! consumed in publish order. Across keys no order is guaranteed.

use crate::error::LogError;
use crate::event::LogRecord;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of consumed records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<LogRecord, LogError>> + Send>>;

/// A partitioned, keyed message log.
///
/// Implementations must be `Send + Sync`: the dispatcher and the
/// consumer loop hold the log behind an `Arc` from different tasks.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Publish one record to `topic`, partitioned by `record.key`.
    ///
    /// # Errors
    ///
    /// [`LogError::PublishFailed`] when the broker rejects or times out.
    async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), LogError>;

    /// Subscribe to `topic` as a member of `group`.
    ///
    /// Members of one group share the partitions between them; each
    /// partition is delivered to exactly one member at a time, in
    /// order.
    ///
    /// # Errors
    ///
    /// [`LogError::SubscriptionFailed`] when the consumer cannot be
    /// created or the subscription is rejected.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<RecordStream, LogError>;
}
