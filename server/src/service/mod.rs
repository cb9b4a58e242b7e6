//! Application services.
//!
//! Write services couple their state mutation to an outbox append in
//! one transaction; read services never touch the outbox. The timeline
//! read path is the only place the materialized cache and the
//! relational store are merged.

mod admin;
mod follow;
mod post;
mod timeline;

pub use admin::{AdminService, ClearedCounts, StatsCounts};
pub use follow::FollowService;
pub use post::PostService;
pub use timeline::TimelineService;
