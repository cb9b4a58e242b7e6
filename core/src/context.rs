//! Explicit per-request context.
//!
//! The caller identity, request id and shard travel with the request as
//! a value, never as hidden task-local state. The HTTP edge constructs
//! the context from the trusted headers; the log consumer reconstructs
//! it from the record key and headers before touching storage.

use crate::model::UserId;
use uuid::Uuid;

/// Context of one unit of work (an HTTP request or a consumed record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// The authenticated caller, or the aggregate owner on the consumer
    /// path.
    pub user_id: UserId,
    /// Correlation id, echoed in responses and propagated through the
    /// outbox into log headers.
    pub request_id: String,
    /// Shard owning `user_id`'s relational state.
    pub shard: u32,
}

impl RequestContext {
    /// Build a context for `user_id` with the given request id.
    #[must_use]
    pub fn new(user_id: UserId, request_id: impl Into<String>, shard: u32) -> Self {
        Self { user_id, request_id: request_id.into(), shard }
    }

    /// A fresh server-generated request id, used when the caller sent
    /// none.
    #[must_use]
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_request_ids_are_unique() {
        let a = RequestContext::generate_request_id();
        let b = RequestContext::generate_request_id();
        assert_ne!(a, b);
    }
}
