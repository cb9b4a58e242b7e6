//! Follows table adapter.
//!
//! The follow graph is queried from both ends: `find_following` pages a
//! user's followees, `find_followers` / `follower_ids` /
//! `count_followers` look at who follows a user. Edge pages are ordered
//! by edge creation time, newest first, with the previous page's last
//! `followed_at` as the exclusive cursor.

use crate::ShardSet;
use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::model::{User, UserId};
use chirp_core::store::{FollowStore, FollowedUser};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

/// Read access to the `follows` table.
#[derive(Clone)]
pub struct PgFollowStore {
    shards: ShardSet,
}

impl PgFollowStore {
    /// A store over the given shard set.
    #[must_use]
    pub const fn new(shards: ShardSet) -> Self {
        Self { shards }
    }

    fn row_to_followed_user(row: &PgRow) -> FollowedUser {
        FollowedUser {
            user: User {
                id: UserId::from_uuid(row.get("id")),
                created_at: row.get("user_created_at"),
            },
            followed_at: row.get("followed_at"),
        }
    }
}

#[async_trait]
impl FollowStore for PgFollowStore {
    async fn exists(&self, follower: UserId, followee: UserId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
        )
        .bind(follower.as_uuid())
        .bind(followee.as_uuid())
        .fetch_one(self.shards.pool_for(follower))
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(exists)
    }

    async fn find_following(
        &self,
        user: UserId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FollowedUser>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let pool = self.shards.pool_for(user);

        let rows = if let Some(cursor) = cursor {
            sqlx::query(
                r"
                SELECT u.id, u.created_at AS user_created_at, f.created_at AS followed_at
                FROM follows f
                JOIN users u ON f.followee_id = u.id
                WHERE f.follower_id = $1 AND f.created_at < $2
                ORDER BY f.created_at DESC
                LIMIT $3
                ",
            )
            .bind(user.as_uuid())
            .bind(cursor)
            .bind(limit)
            .fetch_all(pool)
            .await
        } else {
            sqlx::query(
                r"
                SELECT u.id, u.created_at AS user_created_at, f.created_at AS followed_at
                FROM follows f
                JOIN users u ON f.followee_id = u.id
                WHERE f.follower_id = $1
                ORDER BY f.created_at DESC
                LIMIT $2
                ",
            )
            .bind(user.as_uuid())
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_followed_user).collect())
    }

    async fn find_followers(
        &self,
        user: UserId,
        cursor: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FollowedUser>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let pool = self.shards.pool_for(user);

        let rows = if let Some(cursor) = cursor {
            sqlx::query(
                r"
                SELECT u.id, u.created_at AS user_created_at, f.created_at AS followed_at
                FROM follows f
                JOIN users u ON f.follower_id = u.id
                WHERE f.followee_id = $1 AND f.created_at < $2
                ORDER BY f.created_at DESC
                LIMIT $3
                ",
            )
            .bind(user.as_uuid())
            .bind(cursor)
            .bind(limit)
            .fetch_all(pool)
            .await
        } else {
            sqlx::query(
                r"
                SELECT u.id, u.created_at AS user_created_at, f.created_at AS followed_at
                FROM follows f
                JOIN users u ON f.follower_id = u.id
                WHERE f.followee_id = $1
                ORDER BY f.created_at DESC
                LIMIT $2
                ",
            )
            .bind(user.as_uuid())
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_followed_user).collect())
    }

    async fn follower_ids(&self, user: UserId) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT follower_id FROM follows WHERE followee_id = $1")
                .bind(user.as_uuid())
                .fetch_all(self.shards.pool_for(user))
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    async fn count_followers(&self, user: UserId) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE followee_id = $1")
                .bind(user.as_uuid())
                .fetch_one(self.shards.pool_for(user))
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn followed_celebrities(
        &self,
        user: UserId,
        threshold: u64,
    ) -> Result<Vec<UserId>, StoreError> {
        let threshold = i64::try_from(threshold).unwrap_or(i64::MAX);
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"
            SELECT f.followee_id
            FROM follows f
            WHERE f.follower_id = $1
              AND (SELECT COUNT(*) FROM follows f2 WHERE f2.followee_id = f.followee_id) > $2
            ",
        )
        .bind(user.as_uuid())
        .bind(threshold)
        .fetch_all(self.shards.pool_for(user))
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut total: i64 = 0;
        for pool in self.shards.pools() {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows")
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
            let result = sqlx::query("DELETE FROM follows")
                .execute(pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}
