//! Users table adapter.

use crate::ShardSet;
use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::model::{User, UserId};
use chirp_core::store::UserStore;

/// Read/upsert access to the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    shards: ShardSet,
}

impl PgUserStore {
    /// A store over the given shard set.
    #[must_use]
    pub const fn new(shards: ShardSet) -> Self {
        Self { shards }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn upsert_if_absent(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO users (id, created_at)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(user.id.as_uuid())
        .bind(user.created_at)
        .execute(self.shards.pool_for(user.id))
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, id: UserId) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(self.shards.pool_for(id))
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(exists)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut total: i64 = 0;
        for pool in self.shards.pools() {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
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
            let result = sqlx::query("DELETE FROM users")
                .execute(pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}
