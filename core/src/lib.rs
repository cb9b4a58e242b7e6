//! # Chirp Core
//!
//! Domain model and contracts for the Chirp microblogging backend.
//!
//! The defining problem of the system is not the CRUD surface but the
//! timeline materialization pipeline: how newly-authored posts and
//! follow-graph changes propagate into per-reader, pre-sorted,
//! length-capped timelines that serve the read path in constant time.
//!
//! ```text
//! ┌──────────────┐   one transaction   ┌────────────┐
//! │ write service│────────────────────▶│  outbox    │
//! │ (post/follow)│   domain row +      │  table     │
//! └──────────────┘   outbox row        └─────┬──────┘
//!                                            │ poll (skip-locked)
//!                                            ▼
//!                                      ┌────────────┐
//!                                      │ message log│ keyed by aggregate
//!                                      └─────┬──────┘
//!                                            │ consume (per-partition order)
//!                                            ▼
//!                                      ┌────────────┐
//!                                      │materializer│ fan-out / backfill / purge
//!                                      └─────┬──────┘
//!                                            ▼
//!                                      ┌────────────┐
//!                                      │  timeline  │ sorted set per reader
//!                                      │   cache    │
//!                                      └────────────┘
//! ```
//!
//! This crate holds everything the adapter crates share:
//!
//! - [`model`]: value objects and entities ([`UserId`](model::UserId),
//!   [`Post`](model::Post), [`Follow`](model::Follow), pages)
//! - [`id`]: the time-ordered identifier service
//! - [`event`]: domain events, their wire payloads, and outbox records
//! - [`store`]: storage contracts (relational stores, unit of work,
//!   outbox claims, timeline cache)
//! - [`log`]: the partitioned message-log contract
//! - [`context`]: explicit per-request context
//! - [`shard`]: deterministic user-to-shard routing
//!
//! Implementations live in `chirp-postgres`, `chirp-redis`,
//! `chirp-redpanda` and (for tests) `chirp-testing`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod event;
pub mod id;
pub mod log;
pub mod model;
pub mod shard;
pub mod store;

pub use context::RequestContext;
pub use error::{FollowError, LogError, PostError, StoreError, ValidationError};
pub use event::{DomainEvent, LogRecord, OutboxRecord, RecordHeaders};
pub use id::IdGenerator;
pub use model::{Follow, Page, Post, PostId, User, UserId};
pub use shard::ShardRouter;
