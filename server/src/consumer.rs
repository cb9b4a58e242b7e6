//! Log consumer loop.
//!
//! A subscribe-process-reconnect loop feeding consumed records to the
//! [`TimelineMaterializer`]. Handler failures are logged and the
//! partition advances: a single poisoned record must never halt the
//! pipeline, and the cache it maintains is reconstructible from
//! relational state.
//!
//! The per-record tracing span recovers the request context from the
//! record itself: the request id travels in the headers, and the shard
//! is recomputed from the aggregate key before any storage call runs.

use crate::materializer::TimelineMaterializer;
use chirp_core::log::MessageLog;
use chirp_core::model::UserId;
use chirp_core::shard::ShardRouter;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Consumes the timeline topic and drives the materializer.
pub struct LogConsumer {
    log: Arc<dyn MessageLog>,
    materializer: Arc<TimelineMaterializer>,
    router: ShardRouter,
    topic: String,
    group: String,
    retry_delay: Duration,
}

impl LogConsumer {
    /// Assemble the consumer.
    #[must_use]
    pub fn new(
        log: Arc<dyn MessageLog>,
        materializer: Arc<TimelineMaterializer>,
        router: ShardRouter,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            log,
            materializer,
            router,
            topic: topic.into(),
            group: group.into(),
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Override the reconnect delay (tests).
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run until a shutdown signal arrives, reconnecting with a delay
    /// whenever the subscription fails or the stream ends.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            topic = %self.topic,
            consumer_group = %self.group,
            "Timeline consumer starting"
        );

        loop {
            let mut stream = match self.log.subscribe(&self.topic, &self.group).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Subscription failed, retrying");
                    tokio::select! {
                        () = tokio::time::sleep(self.retry_delay) => continue,
                        _ = shutdown.recv() => return,
                    }
                }
            };

            loop {
                tokio::select! {
                    record = stream.next() => match record {
                        Some(Ok(record)) => {
                            // Reconstruct the request context the
                            // producer side carried: request id from the
                            // headers, shard from the aggregate key.
                            let shard = UserId::from_trusted(&record.key)
                                .map(|user| self.router.shard_for(user))
                                .unwrap_or(0);
                            let span = tracing::info_span!(
                                "consume_record",
                                event_type = %record.headers.event_type,
                                request_id = record.headers.request_id.as_deref().unwrap_or(""),
                                key = %record.key,
                                shard,
                            );

                            if let Err(e) = self
                                .materializer
                                .handle(&record)
                                .instrument(span)
                                .await
                            {
                                // Log and continue: the partition must
                                // keep advancing past a poisoned record.
                                tracing::error!(
                                    error = %e,
                                    event_type = %record.headers.event_type,
                                    event_id = %record.headers.event_id,
                                    "Failed to apply record, continuing"
                                );
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Error receiving record");
                        }
                        None => {
                            tracing::warn!("Record stream ended, resubscribing");
                            break;
                        }
                    },
                    _ = shutdown.recv() => {
                        tracing::info!("Timeline consumer stopping");
                        return;
                    }
                }
            }

            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
