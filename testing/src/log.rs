//! In-memory message log.
//!
//! A single FIFO per topic. Publish order is preserved globally, which
//! trivially preserves the per-key ordering guarantee the real log
//! provides per partition. Subscribers receive every record already on
//! the topic (earliest offset) and then live records as they arrive.
//!
//! Tests that want to step the pipeline deterministically can skip the
//! subscription API and drain records by index with
//! [`InMemoryMessageLog::records_from`].

use async_trait::async_trait;
use chirp_core::error::LogError;
use chirp_core::event::LogRecord;
use chirp_core::log::{MessageLog, RecordStream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Default)]
struct TopicState {
    records: Vec<LogRecord>,
    subscribers: Vec<mpsc::UnboundedSender<LogRecord>>,
}

/// Shared in-memory log handle.
#[derive(Clone, Default)]
pub struct InMemoryMessageLog {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
}

impl InMemoryMessageLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TopicState>> {
        self.topics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every record published to `topic`, in publish order.
    #[must_use]
    pub fn records(&self, topic: &str) -> Vec<LogRecord> {
        self.lock()
            .get(topic)
            .map(|state| state.records.clone())
            .unwrap_or_default()
    }

    /// Records published to `topic` starting at `offset`, for tests that
    /// drain the log incrementally.
    #[must_use]
    pub fn records_from(&self, topic: &str, offset: usize) -> Vec<LogRecord> {
        self.lock()
            .get(topic)
            .map(|state| state.records.iter().skip(offset).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn publish(&self, topic: &str, record: &LogRecord) -> Result<(), LogError> {
        let mut topics = self.lock();
        let state = topics.entry(topic.to_string()).or_default();
        state.records.push(record.clone());
        state
            .subscribers
            .retain(|tx| tx.send(record.clone()).is_ok());
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _group: &str) -> Result<RecordStream, LogError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut topics = self.lock();
            let state = topics.entry(topic.to_string()).or_default();
            // Earliest-offset semantics: replay the backlog first.
            for record in &state.records {
                let _ = tx.send(record.clone());
            }
            state.subscribers.push(tx);
        }

        let stream = async_stream::stream! {
            while let Some(record) = rx.recv().await {
                yield Ok(record);
            }
        };
        Ok(Box::pin(stream) as RecordStream)
    }
}
