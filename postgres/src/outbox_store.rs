//! Outbox table adapter.
//!
//! The claim uses `FOR UPDATE SKIP LOCKED`: concurrent dispatchers each
//! lock a disjoint slice of the unprocessed queue without blocking on
//! each other, and a claim that is dropped without committing releases
//! its rows back to the queue untouched.

use crate::ShardSet;
use async_trait::async_trait;
use chirp_core::error::StoreError;
use chirp_core::event::OutboxRecord;
use chirp_core::store::{ClaimedBatch, OutboxStore};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

/// Dispatcher-side access to the `outbox` table.
#[derive(Clone)]
pub struct PgOutboxStore {
    shards: ShardSet,
}

impl PgOutboxStore {
    /// A store over the given shard set.
    #[must_use]
    pub const fn new(shards: ShardSet) -> Self {
        Self { shards }
    }

    fn row_to_record(row: &PgRow) -> OutboxRecord {
        OutboxRecord {
            id: row.get("id"),
            event_type: row.get("event_type"),
            aggregate_id: row.get("aggregate_id"),
            payload: row.get("payload"),
            request_id: row.get("request_id"),
            created_at: row.get("created_at"),
            processed_at: None,
        }
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn claim_batch(&self, limit: usize) -> Result<Box<dyn ClaimedBatch>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        // One claim transaction per shard; the locks of every shard are
        // held until the batch commits or drops.
        let mut shard_claims = Vec::new();
        let mut records = Vec::new();

        for pool in self.shards.pools() {
            let mut tx = pool
                .begin()
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

            let rows = sqlx::query(
                r"
                SELECT id, event_type, aggregate_id, payload::text AS payload,
                       request_id, created_at
                FROM outbox
                WHERE processed_at IS NULL
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
                ",
            )
            .bind(limit)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

            let claimed: Vec<OutboxRecord> = rows.iter().map(Self::row_to_record).collect();
            let ids: Vec<Uuid> = claimed.iter().map(|r| r.id).collect();
            records.extend(claimed);
            shard_claims.push((tx, ids));
        }

        // Publish order within the batch follows created_at across shards.
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(Box::new(PgClaimedBatch { shard_claims, records }))
    }

    async fn compact_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut removed = 0;
        for pool in self.shards.pools() {
            let result = sqlx::query(
                "DELETE FROM outbox WHERE processed_at IS NOT NULL AND processed_at < $1",
            )
            .bind(cutoff)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn count_unprocessed(&self) -> Result<u64, StoreError> {
        let mut total: i64 = 0;
        for pool in self.shards.pools() {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE processed_at IS NULL")
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
            let result = sqlx::query("DELETE FROM outbox")
                .execute(pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}

/// A claimed slice of the queue, holding its row locks until resolved.
struct PgClaimedBatch {
    shard_claims: Vec<(Transaction<'static, Postgres>, Vec<Uuid>)>,
    records: Vec<OutboxRecord>,
}

#[async_trait]
impl ClaimedBatch for PgClaimedBatch {
    fn records(&self) -> &[OutboxRecord] {
        &self.records
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        for (mut tx, ids) in self.shard_claims {
            if !ids.is_empty() {
                sqlx::query("UPDATE outbox SET processed_at = NOW() WHERE id = ANY($1)")
                    .bind(&ids)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            tx.commit()
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(())
    }
}
