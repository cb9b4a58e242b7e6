//! Storage contracts.
//!
//! Any strongly-consistent relational store with row-level locking can
//! implement the relational contracts; any store with sorted-set
//! semantics can implement [`TimelineCache`]. The production adapters
//! live in `chirp-postgres` and `chirp-redis`; deterministic in-memory
//! adapters live in `chirp-testing`.
//!
//! # Transactional coupling
//!
//! The write path must make the domain mutation and the outbox append
//! atomic. That unit of work is modeled by [`Database::begin`] /
//! [`StorageTx`]: the service stages mutations on the transaction and
//! either commits or lets it drop (roll back). Likewise the dispatcher's
//! claim holds its row locks inside a [`ClaimedBatch`]: committing marks
//! the records processed; dropping the batch returns them to the queue.

use crate::error::StoreError;
use crate::event::{DomainEvent, OutboxRecord};
use crate::model::{Follow, Post, PostId, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Entry point for transactional writes.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open a transaction on the shard owning `aggregate`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] when no connection can be obtained.
    async fn begin(&self, aggregate: UserId) -> Result<Box<dyn StorageTx>, StoreError>;
}

/// A unit of work over the relational stores.
///
/// All staged mutations become visible atomically at [`commit`];
/// dropping the value without committing rolls everything back.
///
/// [`commit`]: StorageTx::commit
#[async_trait]
pub trait StorageTx: Send {
    /// Insert the user if absent; a no-op on conflict.
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Insert a post. Post ids are unique; posts are never updated.
    async fn save_post(&mut self, post: &Post) -> Result<(), StoreError>;

    /// Insert a follow edge; a no-op when the edge already exists.
    async fn save_follow(&mut self, follow: &Follow) -> Result<(), StoreError>;

    /// Delete a follow edge. Returns whether an edge was removed.
    async fn delete_follow(
        &mut self,
        follower: UserId,
        followee: UserId,
    ) -> Result<bool, StoreError>;

    /// Append the event to the outbox, carrying the request id.
    async fn append_outbox(
        &mut self,
        event: &DomainEvent,
        request_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Commit every staged mutation.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Read access to the users table.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert the user if absent, in its own transaction.
    async fn upsert_if_absent(&self, user: &User) -> Result<(), StoreError>;

    /// Whether the user exists.
    async fn exists(&self, id: UserId) -> Result<bool, StoreError>;

    /// Total number of users.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Remove every user. Returns the number removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

/// Read access to the posts table.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Look up a single post.
    async fn find_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    /// An author's posts, id-descending, starting strictly below the
    /// cursor when one is given.
    async fn find_by_author(
        &self,
        author: UserId,
        cursor: Option<PostId>,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError>;

    /// An author's most recent posts, id-descending.
    async fn find_latest_by_author(
        &self,
        author: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError>;

    /// Bulk lookup. Missing ids are silently absent; order is not
    /// specified.
    async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError>;

    /// Total number of posts.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Remove every post. Returns the number removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

/// A followed or following user together with when the edge was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowedUser {
    /// The user on the other side of the edge.
    pub user: User,
    /// When the edge was created; also the page cursor.
    pub followed_at: DateTime<Utc>,
}

/// Read access to the follow graph.
#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Whether `follower` currently follows `followee`.
    async fn exists(&self, follower: UserId, followee: UserId) -> Result<bool, StoreError>;

    /// Users `user` follows, newest edge first. The cursor is the
    /// `followed_at` of the previous page's last element, exclusive.
    async fn find_following(
        &self,
        user: UserId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FollowedUser>, StoreError>;

    /// Users following `user`, newest edge first, same cursor contract
    /// as [`find_following`](FollowStore::find_following).
    async fn find_followers(
        &self,
        user: UserId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FollowedUser>, StoreError>;

    /// Every follower id of `user`, unpaginated (fan-out input).
    async fn follower_ids(&self, user: UserId) -> Result<Vec<UserId>, StoreError>;

    /// Number of followers of `user`.
    async fn count_followers(&self, user: UserId) -> Result<u64, StoreError>;

    /// Users that `user` follows whose follower count strictly exceeds
    /// `threshold`.
    async fn followed_celebrities(
        &self,
        user: UserId,
        threshold: u64,
    ) -> Result<Vec<UserId>, StoreError>;

    /// Total number of follow edges.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Remove every edge. Returns the number removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

/// The dispatcher's view of the outbox table.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Claim up to `limit` unprocessed records, oldest first, with
    /// skip-locked row locks so concurrent dispatchers share the queue
    /// without blocking or double-claiming.
    ///
    /// The locks are held for the lifetime of the returned batch.
    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, StoreError>;

    /// Delete processed records older than `cutoff`. Returns the number
    /// removed.
    async fn compact_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Number of undelivered records.
    async fn count_unprocessed(&self) -> Result<u64, StoreError>;

    /// Remove every record. Returns the number removed.
    async fn delete_all(&self) -> Result<u64, StoreError>;
}

/// A claimed, still-locked slice of the outbox queue.
///
/// Commit after publishing to mark the records processed. Dropping the
/// batch without committing rolls the claim back, so a crash between
/// publish and commit re-delivers the same records on the next tick;
/// the materializer is idempotent, so that is the accepted contract.
#[async_trait]
pub trait ClaimedBatch: Send {
    /// The claimed records, `created_at` ascending.
    fn records(&self) -> &[OutboxRecord];

    /// Mark every claimed record processed and release the locks.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// A `(post, score)` pair destined for a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredPost {
    /// The post to place on the timeline.
    pub post_id: PostId,
    /// Timeline score: the id-embedded millisecond timestamp.
    pub score: i64,
}

impl ScoredPost {
    /// Pair a post id with its canonical score.
    #[must_use]
    pub fn new(post_id: PostId) -> Self {
        Self { post_id, score: post_id.timestamp_ms() }
    }
}

/// Per-reader materialized timeline: a sorted set of post ids keyed by
/// the post's embedded timestamp.
///
/// Writes are commutative on distinct `(member, score)` pairs and
/// idempotent for equal pairs, which is what makes at-least-once
/// delivery safe. Every write trims the set to the configured cap,
/// evicting the lowest scores.
#[async_trait]
pub trait TimelineCache: Send + Sync {
    /// Add one post to `reader`'s timeline.
    async fn add(&self, reader: UserId, entry: ScoredPost) -> Result<(), StoreError>;

    /// Add many posts to `reader`'s timeline in one round trip.
    async fn add_many(&self, reader: UserId, entries: &[ScoredPost]) -> Result<(), StoreError>;

    /// Remove one post from `reader`'s timeline; absent members are a
    /// no-op.
    async fn remove(&self, reader: UserId, post_id: PostId) -> Result<(), StoreError>;

    /// Remove posts from `reader`'s timeline; absent members are a
    /// no-op.
    async fn remove_many(&self, reader: UserId, post_ids: &[PostId]) -> Result<(), StoreError>;

    /// Read `reader`'s timeline, score-descending. When
    /// `max_score_exclusive` is set only entries with a strictly lower
    /// score are returned.
    async fn range(
        &self,
        reader: UserId,
        max_score_exclusive: Option<i64>,
        limit: usize,
    ) -> Result<Vec<PostId>, StoreError>;

    /// Evict the lowest-scored entries beyond `max_size`.
    async fn trim(&self, reader: UserId, max_size: usize) -> Result<(), StoreError>;

    /// Drop every timeline. Returns the number of timelines removed.
    async fn flush_all(&self) -> Result<u64, StoreError>;
}
