//! Application metrics.
//!
//! Counters are kept twice: emitted through the `metrics` facade for
//! whatever exporter the deployment installs, and mirrored in atomics
//! on [`AppMetrics`] so the demo surface can report and reset them
//! (exporter counters are monotonic and cannot be rezeroed).

use metrics::{counter, describe_counter, describe_histogram, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Register metric descriptions. Call once at startup.
pub fn register_metrics() {
    describe_counter!("chirp_posts_created_total", "Total number of posts created");
    describe_counter!("chirp_follows_total", "Total number of follow actions");
    describe_counter!("chirp_unfollows_total", "Total number of unfollow actions");
    describe_counter!(
        "chirp_timeline_requests_total",
        "Total number of timeline read requests"
    );
    describe_counter!(
        "chirp_outbox_events_published_total",
        "Total number of outbox events published to the message log"
    );
    describe_histogram!(
        "chirp_timeline_fanout_duration_seconds",
        "Time taken to fan a post out to its followers"
    );
    tracing::info!("Application metrics registered");
}

/// Resettable application counters.
#[derive(Debug, Default)]
pub struct AppMetrics {
    posts_created: AtomicU64,
    follows: AtomicU64,
    unfollows: AtomicU64,
    timeline_requests: AtomicU64,
    outbox_events_published: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Posts created since start or last reset.
    pub posts_created: u64,
    /// Follow actions since start or last reset.
    pub follows: u64,
    /// Unfollow actions since start or last reset.
    pub unfollows: u64,
    /// Timeline reads since start or last reset.
    pub timeline_requests: u64,
    /// Outbox events published since start or last reset.
    pub outbox_events_published: u64,
}

impl AppMetrics {
    /// Fresh zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created post.
    pub fn increment_posts_created(&self) {
        self.posts_created.fetch_add(1, Ordering::Relaxed);
        counter!("chirp_posts_created_total").increment(1);
    }

    /// Record a follow.
    pub fn increment_follows(&self) {
        self.follows.fetch_add(1, Ordering::Relaxed);
        counter!("chirp_follows_total").increment(1);
    }

    /// Record an unfollow.
    pub fn increment_unfollows(&self) {
        self.unfollows.fetch_add(1, Ordering::Relaxed);
        counter!("chirp_unfollows_total").increment(1);
    }

    /// Record a timeline read.
    pub fn increment_timeline_requests(&self) {
        self.timeline_requests.fetch_add(1, Ordering::Relaxed);
        counter!("chirp_timeline_requests_total").increment(1);
    }

    /// Record published outbox events.
    pub fn increment_outbox_events_published(&self, count: u64) {
        self.outbox_events_published.fetch_add(count, Ordering::Relaxed);
        counter!("chirp_outbox_events_published_total").increment(count);
    }

    /// Record one fan-out pass.
    pub fn observe_fanout_duration(&self, duration: Duration) {
        histogram!("chirp_timeline_fanout_duration_seconds").record(duration.as_secs_f64());
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            posts_created: self.posts_created.load(Ordering::Relaxed),
            follows: self.follows.load(Ordering::Relaxed),
            unfollows: self.unfollows.load(Ordering::Relaxed),
            timeline_requests: self.timeline_requests.load(Ordering::Relaxed),
            outbox_events_published: self.outbox_events_published.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter (the demo reset semantics). Exporter-side
    /// counters keep counting; only the application view restarts.
    pub fn reset_all(&self) {
        tracing::info!("Resetting application metrics");
        self.posts_created.store(0, Ordering::Relaxed);
        self.follows.store(0, Ordering::Relaxed);
        self.unfollows.store(0, Ordering::Relaxed);
        self.timeline_requests.store(0, Ordering::Relaxed);
        self.outbox_events_published.store(0, Ordering::Relaxed);
    }
}
