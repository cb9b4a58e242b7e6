//! # Chirp Testing
//!
//! Deterministic in-memory implementations of every Chirp contract,
//! for unit and end-to-end tests that need no running infrastructure.
//!
//! - [`InMemoryDatabase`] implements the relational contracts
//!   (`Database`/`StorageTx`, `UserStore`, `PostStore`, `FollowStore`,
//!   `OutboxStore`) over shared maps, including the claim/commit/rollback
//!   life cycle of outbox batches.
//! - [`InMemoryTimelineCache`] implements the sorted-set timeline cache
//!   with the same score-then-member ordering Redis uses.
//! - [`InMemoryMessageLog`] implements the message log as an append-only
//!   vector per topic, preserving publish order (which trivially
//!   preserves per-key order), with a synchronous drain for tests that
//!   want to step the pipeline by hand.
//!
//! All three are cheaply cloneable handles over shared state, so a test
//! can hold one handle for assertions while the system under test holds
//! another.

pub mod cache;
pub mod log;
pub mod stores;

pub use cache::InMemoryTimelineCache;
pub use log::InMemoryMessageLog;
pub use stores::InMemoryDatabase;
