//! `PostgreSQL` implementations of the Chirp storage contracts.
//!
//! This crate provides sqlx-backed adapters for the relational side of
//! the pipeline:
//!
//! - [`PgDatabase`]: the transactional unit of work used by the write
//!   services (domain row + outbox row in one transaction)
//! - [`PgUserStore`], [`PgPostStore`], [`PgFollowStore`]: read adapters
//! - [`PgOutboxStore`]: skip-locked batch claims for the dispatcher
//!
//! # Sharding
//!
//! All adapters route through a [`ShardSet`]: a deterministic
//! `hash(user) mod N` choice of connection pool. With one configured
//! URL the set degenerates to a single pool and routing is the
//! identity; nothing here depends on `N > 1` for correctness.
//!
//! # Migrations
//!
//! Schema migrations are embedded at compile time from the workspace
//! `migrations/` directory and applied idempotently via
//! [`ShardSet::run_migrations`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod follow_store;
mod outbox_store;
mod post_store;
mod user_store;

pub use database::{PgDatabase, PgStorageTx};
pub use follow_store::PgFollowStore;
pub use outbox_store::PgOutboxStore;
pub use post_store::PgPostStore;
pub use user_store::PgUserStore;

use chirp_core::error::StoreError;
use chirp_core::model::UserId;
use chirp_core::shard::ShardRouter;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// A set of connection pools, one per relational shard.
///
/// Every adapter in this crate holds a `ShardSet` and picks its pool by
/// the aggregate user id of the operation; operations without a natural
/// owner (bulk lookups, counts, wipes) go to every pool.
#[derive(Clone)]
pub struct ShardSet {
    pools: Vec<PgPool>,
    router: ShardRouter,
}

impl ShardSet {
    /// Connect one pool per URL.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] when any pool cannot be created.
    pub async fn connect(urls: &[String], max_connections: u32) -> Result<Self, StoreError> {
        if urls.is_empty() {
            return Err(StoreError::Database("no database urls configured".to_string()));
        }

        let mut pools = Vec::with_capacity(urls.len());
        for url in urls {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            pools.push(pool);
        }

        Ok(Self::from_pools(pools))
    }

    /// Wrap existing pools (shared pools, custom options).
    ///
    /// # Panics
    ///
    /// Panics when `pools` is empty; a shard set without shards cannot
    /// serve anything.
    #[must_use]
    pub fn from_pools(pools: Vec<PgPool>) -> Self {
        assert!(!pools.is_empty(), "ShardSet requires at least one pool");
        let router = ShardRouter::new(u32::try_from(pools.len()).unwrap_or(1));
        Self { pools, router }
    }

    /// The pool owning `user`'s rows.
    #[must_use]
    pub fn pool_for(&self, user: UserId) -> &PgPool {
        &self.pools[self.router.shard_for(user) as usize]
    }

    /// The shard index owning `user`'s rows.
    #[must_use]
    pub fn shard_for(&self, user: UserId) -> u32 {
        self.router.shard_for(user)
    }

    /// All pools, for cross-shard operations.
    #[must_use]
    pub fn pools(&self) -> &[PgPool] {
        &self.pools
    }

    /// Apply all pending schema migrations on every shard.
    ///
    /// Idempotent: already-applied migrations are skipped.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] when a migration fails to execute.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        for pool in &self.pools {
            sqlx::migrate!("../migrations")
                .run(pool)
                .await
                .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
        }
        tracing::info!(shards = self.pools.len(), "Database migrations completed");
        Ok(())
    }
}
