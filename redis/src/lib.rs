//! Redis implementation of the Chirp timeline cache.
//!
//! Each reader's materialized timeline is one sorted set:
//!
//! - **Key**: `timeline:{user-id}`
//! - **Member**: canonical post-id string
//! - **Score**: the post's id-embedded millisecond timestamp
//!
//! Sorted-set `ZADD` is idempotent for an existing `(member, score)`
//! pair and commutative across distinct members, which is exactly what
//! the at-least-once materializer needs. Every write pipeline ends with
//! a `ZREMRANGEBYRANK` that evicts the lowest scores past the
//! configured cap, so a timeline can never grow beyond `max_size`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::model::{PostId, UserId};
use chirp_core::store::{ScoredPost, TimelineCache};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

const TIMELINE_KEY_PREFIX: &str = "timeline:";

/// Sorted-set timeline cache backed by Redis.
///
/// Connections are pooled through a [`ConnectionManager`]; cloning the
/// manager is cheap and each operation works on its own clone.
#[derive(Clone)]
pub struct RedisTimelineCache {
    conn: ConnectionManager,
    max_size: usize,
}

impl RedisTimelineCache {
    /// Connect to Redis.
    ///
    /// `max_size` is the per-reader cap enforced on every write.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] when the client cannot be created or the
    /// connection manager cannot reach the server.
    pub async fn connect(redis_url: &str, max_size: usize) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Database(format!("failed to create Redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Database(format!("failed to connect to Redis: {e}")))?;
        Ok(Self { conn, max_size })
    }

    fn timeline_key(reader: UserId) -> String {
        format!("{TIMELINE_KEY_PREFIX}{reader}")
    }

    /// Negative rank bound that keeps the `max_size` highest scores.
    fn trim_rank_bound(max_size: usize) -> isize {
        -(isize::try_from(max_size).unwrap_or(isize::MAX)) - 1
    }
}

#[async_trait]
impl TimelineCache for RedisTimelineCache {
    async fn add(&self, reader: UserId, entry: ScoredPost) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::timeline_key(reader);

        let _: () = redis::pipe()
            .atomic()
            .zadd(&key, entry.post_id.to_string(), entry.score)
            .ignore()
            .zremrangebyrank(&key, 0, Self::trim_rank_bound(self.max_size))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Database(format!("failed to add timeline entry: {e}")))?;

        tracing::debug!(reader = %reader, post_id = %entry.post_id, "Added post to timeline");
        Ok(())
    }

    async fn add_many(&self, reader: UserId, entries: &[ScoredPost]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let key = Self::timeline_key(reader);

        let scored: Vec<(i64, String)> = entries
            .iter()
            .map(|e| (e.score, e.post_id.to_string()))
            .collect();

        let _: () = redis::pipe()
            .atomic()
            .zadd_multiple(&key, &scored)
            .ignore()
            .zremrangebyrank(&key, 0, Self::trim_rank_bound(self.max_size))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Database(format!("failed to add timeline entries: {e}")))?;

        tracing::debug!(reader = %reader, count = entries.len(), "Added posts to timeline");
        Ok(())
    }

    async fn remove(&self, reader: UserId, post_id: PostId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::timeline_key(reader);

        let _: () = conn
            .zrem(&key, post_id.to_string())
            .await
            .map_err(|e| StoreError::Database(format!("failed to remove timeline entry: {e}")))?;
        Ok(())
    }

    async fn remove_many(&self, reader: UserId, post_ids: &[PostId]) -> Result<(), StoreError> {
        if post_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let key = Self::timeline_key(reader);
        let members: Vec<String> = post_ids.iter().map(ToString::to_string).collect();

        let _: () = conn
            .zrem(&key, members)
            .await
            .map_err(|e| StoreError::Database(format!("failed to remove timeline entries: {e}")))?;

        tracing::debug!(reader = %reader, count = post_ids.len(), "Removed posts from timeline");
        Ok(())
    }

    async fn range(
        &self,
        reader: UserId,
        max_score_exclusive: Option<i64>,
        limit: usize,
    ) -> Result<Vec<PostId>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let key = Self::timeline_key(reader);

        let members: Vec<String> = if let Some(max_score) = max_score_exclusive {
            // Scores are integral milliseconds, so the exclusive bound
            // is the inclusive bound at max_score - 1.
            conn.zrevrangebyscore_limit(
                &key,
                max_score - 1,
                "-inf",
                0,
                isize::try_from(limit).unwrap_or(isize::MAX),
            )
            .await
        } else {
            let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
            conn.zrevrange(&key, 0, stop).await
        }
        .map_err(|e| StoreError::Database(format!("failed to read timeline: {e}")))?;

        members
            .iter()
            .map(|member| {
                PostId::from_trusted(member).map_err(StoreError::Serialization)
            })
            .collect()
    }

    async fn trim(&self, reader: UserId, max_size: usize) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = Self::timeline_key(reader);

        let _: () = conn
            .zremrangebyrank(&key, 0, Self::trim_rank_bound(max_size))
            .await
            .map_err(|e| StoreError::Database(format!("failed to trim timeline: {e}")))?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();

        let keys: Vec<String> = conn
            .keys(format!("{TIMELINE_KEY_PREFIX}*"))
            .await
            .map_err(|e| StoreError::Database(format!("failed to list timeline keys: {e}")))?;

        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len() as u64;

        let _: () = conn
            .del(keys)
            .await
            .map_err(|e| StoreError::Database(format!("failed to delete timeline keys: {e}")))?;

        tracing::info!(count, "Flushed timeline cache");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedisTimelineCache>();
        assert_sync::<RedisTimelineCache>();
    }

    #[test]
    fn timeline_keys_are_per_reader() {
        let a = UserId::random();
        let b = UserId::random();
        assert_ne!(
            RedisTimelineCache::timeline_key(a),
            RedisTimelineCache::timeline_key(b)
        );
        assert!(RedisTimelineCache::timeline_key(a).starts_with("timeline:"));
    }

    #[test]
    fn trim_bound_keeps_top_n() {
        // ZREMRANGEBYRANK key 0 -(n+1) removes everything but the n
        // highest-scored members.
        assert_eq!(RedisTimelineCache::trim_rank_bound(800), -801);
        assert_eq!(RedisTimelineCache::trim_rank_bound(1), -2);
    }
}
