//! Transactional unit of work for the write services.
//!
//! Each write-path use case stages its domain mutation and its outbox
//! append on one [`PgStorageTx`] and commits them atomically. That is
//! the transactional-outbox guarantee: a failure to publish can never
//! lose domain state, and a published event can never reference
//! uncommitted state.

use crate::ShardSet;
use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::event::DomainEvent;
use chirp_core::model::{Follow, Post, User, UserId};
use chirp_core::store::{Database, StorageTx};
use sqlx::{Postgres, Transaction};

/// Factory for write transactions, routed by aggregate.
#[derive(Clone)]
pub struct PgDatabase {
    shards: ShardSet,
}

impl PgDatabase {
    /// A database over the given shard set.
    #[must_use]
    pub const fn new(shards: ShardSet) -> Self {
        Self { shards }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self, aggregate: UserId) -> Result<Box<dyn StorageTx>, StoreError> {
        let tx = self
            .shards
            .pool_for(aggregate)
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Box::new(PgStorageTx { tx }))
    }
}

/// An open `PostgreSQL` transaction implementing the staging contract.
///
/// Dropping the value without calling `commit` rolls everything back.
pub struct PgStorageTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PgStorageTx {
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (id, created_at)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(user.id.as_uuid())
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn save_post(&mut self, post: &Post) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tweets (id, user_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(post.id.as_uuid())
        .bind(post.author.as_uuid())
        .bind(&post.content)
        .bind(post.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn save_follow(&mut self, follow: &Follow) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            ",
        )
        .bind(follow.follower.as_uuid())
        .bind(follow.followee.as_uuid())
        .bind(follow.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_follow(
        &mut self,
        follower: UserId,
        followee: UserId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2",
        )
        .bind(follower.as_uuid())
        .bind(followee.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_outbox(
        &mut self,
        event: &DomainEvent,
        request_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let payload = event
            .payload_json()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO outbox (id, event_type, aggregate_id, payload, request_id, created_at)
            VALUES ($1, $2, $3, $4::jsonb, $5, $6)
            ",
        )
        .bind(event.event_id())
        .bind(event.event_type())
        .bind(event.aggregate_id())
        .bind(payload)
        .bind(request_id)
        .bind(event.occurred_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(
            event_type = event.event_type(),
            event_id = %event.event_id(),
            "Event staged in outbox"
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
