//! Timeline materializer: the event-consumer side of the pipeline.
//!
//! Applies the hybrid fan-out policy:
//!
//! - `POST_CREATED` by a regular author → write the post into every
//!   follower's cached timeline (fan-out on write);
//! - `POST_CREATED` by a celebrity (follower count above the threshold)
//!   → do nothing; readers merge those posts on demand;
//! - `USER_FOLLOWED` → backfill the followee's recent posts into the
//!   follower's timeline (bounded and one-shot, so it also runs for
//!   celebrities);
//! - `USER_UNFOLLOWED` → purge the followee's recent posts from the
//!   follower's timeline.
//!
//! Every handler is idempotent: re-adding a `(post, score)` pair and
//! re-removing an absent member are no-ops, so at-least-once delivery
//! cannot corrupt a timeline.

use crate::metrics::AppMetrics;
use chirp_core::event::{
    FollowEdgePayload, LogRecord, PostCreatedPayload, POST_CREATED, USER_FOLLOWED,
    USER_UNFOLLOWED,
};
use chirp_core::model::{PostId, UserId};
use chirp_core::store::{FollowStore, PostStore, ScoredPost, TimelineCache};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// A record could not be applied to the timelines.
#[derive(Error, Debug)]
pub enum MaterializeError {
    /// The payload was not the expected JSON document.
    #[error("malformed event payload: {0}")]
    Payload(String),

    /// A storage call failed.
    #[error(transparent)]
    Store(#[from] chirp_core::error::StoreError),
}

/// Applies timeline events to the materialized caches.
pub struct TimelineMaterializer {
    cache: Arc<dyn TimelineCache>,
    posts: Arc<dyn PostStore>,
    follows: Arc<dyn FollowStore>,
    celebrity_threshold: u64,
    timeline_max_size: usize,
    metrics: Arc<AppMetrics>,
}

impl TimelineMaterializer {
    /// Assemble the materializer.
    #[must_use]
    pub fn new(
        cache: Arc<dyn TimelineCache>,
        posts: Arc<dyn PostStore>,
        follows: Arc<dyn FollowStore>,
        celebrity_threshold: u64,
        timeline_max_size: usize,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            cache,
            posts,
            follows,
            celebrity_threshold,
            timeline_max_size,
            metrics,
        }
    }

    /// Apply one consumed record. Unknown event types are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`MaterializeError`] when the payload is malformed or storage
    /// fails. The caller logs and continues; the cache is
    /// reconstructible from relational state, so a lost event degrades
    /// freshness, not correctness.
    pub async fn handle(&self, record: &LogRecord) -> Result<(), MaterializeError> {
        match record.headers.event_type.as_str() {
            POST_CREATED => self.handle_post_created(&record.payload).await,
            USER_FOLLOWED => self.handle_user_followed(&record.payload).await,
            USER_UNFOLLOWED => self.handle_user_unfollowed(&record.payload).await,
            other => {
                tracing::warn!(event_type = other, "Unknown event type, skipping");
                Ok(())
            }
        }
    }

    async fn handle_post_created(&self, payload: &str) -> Result<(), MaterializeError> {
        let payload: PostCreatedPayload =
            serde_json::from_str(payload).map_err(|e| MaterializeError::Payload(e.to_string()))?;
        let author = UserId::from_uuid(payload.user_id.value);
        let post_id = PostId::from_uuid(payload.tweet_id);
        let entry = ScoredPost::new(post_id);

        let follower_count = self.follows.count_followers(author).await?;
        if follower_count > self.celebrity_threshold {
            tracing::debug!(
                author = %author,
                follower_count,
                threshold = self.celebrity_threshold,
                post_id = %post_id,
                "Skipping fan-out for celebrity author"
            );
            return Ok(());
        }

        let started = Instant::now();
        let followers = self.follows.follower_ids(author).await?;
        tracing::debug!(post_id = %post_id, followers = followers.len(), "Fanning out post");

        for follower in followers {
            self.cache.add(follower, entry).await?;
        }
        self.metrics.observe_fanout_duration(started.elapsed());
        Ok(())
    }

    async fn handle_user_followed(&self, payload: &str) -> Result<(), MaterializeError> {
        let payload: FollowEdgePayload =
            serde_json::from_str(payload).map_err(|e| MaterializeError::Payload(e.to_string()))?;
        let follower = UserId::from_uuid(payload.follower_id.value);
        let followee = UserId::from_uuid(payload.followee_id.value);

        // One bounded backfill per follow is cheap, so it also runs for
        // celebrity followees; only their live posts stay on-demand.
        let recent = self
            .posts
            .find_latest_by_author(followee, self.timeline_max_size)
            .await?;
        if recent.is_empty() {
            return Ok(());
        }

        let entries: Vec<ScoredPost> =
            recent.iter().map(|post| ScoredPost::new(post.id)).collect();
        self.cache.add_many(follower, &entries).await?;
        tracing::debug!(
            follower = %follower,
            followee = %followee,
            count = entries.len(),
            "Backfilled timeline after follow"
        );
        Ok(())
    }

    async fn handle_user_unfollowed(&self, payload: &str) -> Result<(), MaterializeError> {
        let payload: FollowEdgePayload =
            serde_json::from_str(payload).map_err(|e| MaterializeError::Payload(e.to_string()))?;
        let follower = UserId::from_uuid(payload.follower_id.value);
        let followee = UserId::from_uuid(payload.followee_id.value);

        let recent = self
            .posts
            .find_latest_by_author(followee, self.timeline_max_size)
            .await?;
        if recent.is_empty() {
            return Ok(());
        }

        let post_ids: Vec<PostId> = recent.iter().map(|post| post.id).collect();
        self.cache.remove_many(follower, &post_ids).await?;
        tracing::debug!(
            follower = %follower,
            followee = %followee,
            count = post_ids.len(),
            "Purged timeline after unfollow"
        );
        Ok(())
    }
}
