//! Tweets table adapter.
//!
//! Author scans are id-descending: post ids embed their creation
//! timestamp, so id order is chronological order and the `(user_id, id
//! DESC)` index serves every page directly.

use crate::ShardSet;
use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::model::{Post, PostId, UserId};
use chirp_core::store::PostStore;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

/// Read access to the `tweets` table.
#[derive(Clone)]
pub struct PgPostStore {
    shards: ShardSet,
}

impl PgPostStore {
    /// A store over the given shard set.
    #[must_use]
    pub const fn new(shards: ShardSet) -> Self {
        Self { shards }
    }

    fn row_to_post(row: &PgRow) -> Post {
        Post {
            id: PostId::from_uuid(row.get("id")),
            author: UserId::from_uuid(row.get("user_id")),
            content: row.get("content"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn find_by_id(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        // Single-post lookups have no owning user in hand; scan shards
        // until a row turns up (one query in the common single-shard
        // deployment).
        for pool in self.shards.pools() {
            let row = sqlx::query(
                "SELECT id, user_id, content, created_at FROM tweets WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

            if let Some(row) = row {
                return Ok(Some(Self::row_to_post(&row)));
            }
        }
        Ok(None)
    }

    async fn find_by_author(
        &self,
        author: UserId,
        cursor: Option<PostId>,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let pool = self.shards.pool_for(author);

        let rows = if let Some(cursor) = cursor {
            sqlx::query(
                r"
                SELECT id, user_id, content, created_at
                FROM tweets
                WHERE user_id = $1 AND id < $2
                ORDER BY id DESC
                LIMIT $3
                ",
            )
            .bind(author.as_uuid())
            .bind(cursor.as_uuid())
            .bind(limit)
            .fetch_all(pool)
            .await
        } else {
            sqlx::query(
                r"
                SELECT id, user_id, content, created_at
                FROM tweets
                WHERE user_id = $1
                ORDER BY id DESC
                LIMIT $2
                ",
            )
            .bind(author.as_uuid())
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_post).collect())
    }

    async fn find_latest_by_author(
        &self,
        author: UserId,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        self.find_by_author(author, None, limit).await
    }

    async fn find_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Uuid> = ids.iter().map(PostId::as_uuid).collect();

        let mut posts = Vec::with_capacity(ids.len());
        for pool in self.shards.pools() {
            let rows = sqlx::query(
                "SELECT id, user_id, content, created_at FROM tweets WHERE id = ANY($1)",
            )
            .bind(&raw)
            .fetch_all(pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
            posts.extend(rows.iter().map(Self::row_to_post));
        }
        Ok(posts)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut total: i64 = 0;
        for pool in self.shards.pools() {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tweets")
                .fetch_one(pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            total += count;
        }
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut removed = 0;
        for pool in self.shards.pools() {
            let result = sqlx::query("DELETE FROM tweets")
                .execute(pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}
