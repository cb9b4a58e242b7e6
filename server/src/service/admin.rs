//! Demo/admin surface: entity counts and full reset.

use crate::metrics::AppMetrics;
use chirp_core::error::StoreError;
use chirp_core::store::{FollowStore, OutboxStore, PostStore, TimelineCache, UserStore};
use serde::Serialize;
use std::sync::Arc;

/// Current entity counts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsCounts {
    /// Registered (or placeholder) users.
    pub users: u64,
    /// Posts.
    pub posts: u64,
    /// Follow edges.
    pub follows: u64,
    /// Outbox records not yet dispatched.
    pub pending_events: u64,
}

/// Rows removed by a reset, per store.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClearedCounts {
    /// Users removed.
    pub users: u64,
    /// Posts removed.
    pub posts: u64,
    /// Follow edges removed.
    pub follows: u64,
    /// Outbox records removed.
    pub outbox: u64,
    /// Timelines flushed from the cache.
    pub timelines: u64,
}

/// Reports stats and wipes every store for demo resets.
pub struct AdminService {
    users: Arc<dyn UserStore>,
    posts: Arc<dyn PostStore>,
    follows: Arc<dyn FollowStore>,
    outbox: Arc<dyn OutboxStore>,
    cache: Arc<dyn TimelineCache>,
    metrics: Arc<AppMetrics>,
}

impl AdminService {
    /// Assemble the service.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        posts: Arc<dyn PostStore>,
        follows: Arc<dyn FollowStore>,
        outbox: Arc<dyn OutboxStore>,
        cache: Arc<dyn TimelineCache>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self { users, posts, follows, outbox, cache, metrics }
    }

    /// Current entity counts.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when any count fails.
    pub async fn stats(&self) -> Result<StatsCounts, StoreError> {
        Ok(StatsCounts {
            users: self.users.count().await?,
            posts: self.posts.count().await?,
            follows: self.follows.count().await?,
            pending_events: self.outbox.count_unprocessed().await?,
        })
    }

    /// Wipe every store and rezero the application counters.
    ///
    /// # Errors
    ///
    /// [`StoreError`] when any wipe fails; stores already cleared stay
    /// cleared.
    pub async fn reset(&self) -> Result<ClearedCounts, StoreError> {
        tracing::warn!("Demo reset initiated, clearing all stores");

        let cleared = ClearedCounts {
            follows: self.follows.delete_all().await?,
            posts: self.posts.delete_all().await?,
            users: self.users.delete_all().await?,
            outbox: self.outbox.delete_all().await?,
            timelines: self.cache.flush_all().await?,
        };

        self.metrics.reset_all();

        tracing::warn!(
            users = cleared.users,
            posts = cleared.posts,
            follows = cleared.follows,
            outbox = cleared.outbox,
            timelines = cleared.timelines,
            "Demo reset completed"
        );
        Ok(cleared)
    }
}
