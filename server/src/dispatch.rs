//! Outbox dispatcher and compactor.
//!
//! The dispatcher drains the outbox into the message log. Each tick is
//! one claim-publish-commit cycle:
//!
//! ```text
//! NEW ──claim (skip-locked)──▶ CLAIMED ──publish──▶ PUBLISHED
//!                                                       │ commit
//!                                                       ▼
//!                              ◀──── (24h) ────── PROCESSED ──▶ COMPACTED
//! ```
//!
//! A crash (or publish failure) between publish and commit drops the
//! claim, the rows re-enter NEW, and the next tick republishes them.
//! The materializer is idempotent, so the duplicate is harmless;
//! at-least-once is the delivery contract.

use crate::metrics::AppMetrics;
use chirp_core::event::LogRecord;
use chirp_core::log::MessageLog;
use chirp_core::store::OutboxStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A dispatch tick failed; the claimed rows were rolled back.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The outbox claim or commit failed.
    #[error(transparent)]
    Store(#[from] chirp_core::error::StoreError),

    /// Publishing to the log failed.
    #[error(transparent)]
    Log(#[from] chirp_core::error::LogError),
}

/// Drains unprocessed outbox records into the message log.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    log: Arc<dyn MessageLog>,
    topic: String,
    poll_interval: Duration,
    batch_size: usize,
    metrics: Arc<AppMetrics>,
}

impl OutboxDispatcher {
    /// Assemble the dispatcher.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        log: Arc<dyn MessageLog>,
        topic: impl Into<String>,
        poll_interval: Duration,
        batch_size: usize,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            outbox,
            log,
            topic: topic.into(),
            poll_interval,
            batch_size,
            metrics,
        }
    }

    /// One claim-publish-commit cycle. Returns how many records were
    /// dispatched.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] when the claim, a publish, or the commit
    /// fails. The claim rolls back in every error case, so the records
    /// stay eligible for the next tick.
    pub async fn tick(&self) -> Result<usize, DispatchError> {
        let batch = self.outbox.claim_batch(self.batch_size).await?;
        let count = batch.records().len();
        if count == 0 {
            return Ok(0);
        }

        tracing::debug!(count, "Dispatching outbox batch");

        for record in batch.records() {
            self.log
                .publish(&self.topic, &LogRecord::from_outbox(record))
                .await?;
            tracing::debug!(
                event_type = %record.event_type,
                aggregate_id = %record.aggregate_id,
                event_id = %record.id,
                "Event published"
            );
        }

        batch.commit().await?;

        self.metrics
            .increment_outbox_events_published(count as u64);
        tracing::info!(count, "Published outbox events to the log");
        Ok(count)
    }

    /// Run the poll loop until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            topic = %self.topic,
            interval_ms = self.poll_interval.as_millis(),
            batch_size = self.batch_size,
            "Outbox dispatcher starting"
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        // The claim rolled back; retry on the next tick.
                        tracing::error!(error = %e, "Dispatch tick failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Outbox dispatcher stopping");
                    return;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Deletes processed outbox rows past the retention window.
pub struct OutboxCompactor {
    outbox: Arc<dyn OutboxStore>,
    retention: Duration,
    sweep_interval: Duration,
}

impl OutboxCompactor {
    /// A compactor with the default hourly sweep.
    #[must_use]
    pub fn new(outbox: Arc<dyn OutboxStore>, retention: Duration) -> Self {
        Self { outbox, retention, sweep_interval: Duration::from_secs(60 * 60) }
    }

    /// Override the sweep interval (tests).
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// One compaction sweep. Returns how many rows were removed.
    ///
    /// # Errors
    ///
    /// [`chirp_core::error::StoreError`] when the delete fails.
    pub async fn sweep(&self) -> Result<u64, chirp_core::error::StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        let removed = self.outbox.compact_processed_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, "Compacted processed outbox records");
        }
        Ok(removed)
    }

    /// Run the sweep loop until a shutdown signal arrives.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            retention_hours = self.retention.as_secs() / 3600,
            "Outbox compactor starting"
        );
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; skip it
        // so the first sweep happens one interval after startup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Outbox compaction failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Outbox compactor stopping");
                    return;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
