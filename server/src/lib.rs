//! Chirp server: the application layer of the microblogging backend.
//!
//! Wires the domain and adapter crates into the running system:
//!
//! - [`service`]: write services (transactional outbox), read services
//!   (merged timeline, author history, follow listings), admin surface
//! - [`dispatch`]: the outbox poller and the hourly compactor
//! - [`materializer`] + [`consumer`]: the log consumer that maintains
//!   the per-reader timelines
//! - [`web`]: the axum HTTP edge (identity middleware, handlers, DTOs)
//! - [`config`]: environment-driven configuration
//! - [`metrics`]: resettable application counters

#![forbid(unsafe_code)]

pub mod config;
pub mod consumer;
pub mod cursor;
pub mod dispatch;
pub mod materializer;
pub mod metrics;
pub mod service;
pub mod web;
