//! Error types for the domain and its contracts.
//!
//! Expected business failures are values, not panics: every write
//! service returns a tagged error enum, and the HTTP edge translates
//! each variant into a stable surface code. Infrastructure failures are
//! carried separately ([`StoreError`], [`LogError`]) and surface as
//! `INTERNAL_ERROR`.

use crate::model::UserId;
use thiserror::Error;

/// Domain validation failures.
///
/// These are produced by the value-object constructors
/// ([`UserId::parse`](crate::model::UserId::parse),
/// [`Post::create`](crate::model::Post::create),
/// [`Follow::create`](crate::model::Follow::create)) before any state
/// is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// User id was empty or blank.
    #[error("User ID cannot be empty")]
    UserIdEmpty,

    /// User id was not a valid canonical UUID.
    #[error("User ID must be a valid UUID format: {0}")]
    UserIdInvalidFormat(String),

    /// Post content was empty after trimming.
    #[error("Post content cannot be empty")]
    EmptyContent,

    /// Post content exceeded the length cap after trimming.
    #[error("Post content exceeds {max} characters (was {length})")]
    ContentTooLong {
        /// Trimmed length in Unicode code points.
        length: usize,
        /// Maximum allowed code points.
        max: usize,
    },

    /// A user tried to follow themselves.
    #[error("Cannot follow yourself")]
    SelfFollow,
}

impl ValidationError {
    /// Stable surface code for the HTTP error body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UserIdEmpty => "USER_ID_EMPTY",
            Self::UserIdInvalidFormat(_) => "USER_ID_INVALID_FORMAT",
            Self::EmptyContent => "TWEET_CONTENT_EMPTY",
            Self::ContentTooLong { .. } => "TWEET_CONTENT_TOO_LONG",
            Self::SelfFollow => "SELF_FOLLOW",
        }
    }
}

/// Failures of the post write/read operations.
#[derive(Error, Debug)]
pub enum PostError {
    /// Content or id validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The storage layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the follow/unfollow operations.
///
/// `AlreadyFollowing` and `NotFollowing` are state checks against the
/// follow table, not domain validation; they map to HTTP 409.
#[derive(Error, Debug)]
pub enum FollowError {
    /// Follower/followee validation failed (currently only self-follow).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The relationship already exists.
    #[error("User {follower} is already following {followee}")]
    AlreadyFollowing {
        /// Requesting user.
        follower: UserId,
        /// Target user.
        followee: UserId,
    },

    /// The relationship does not exist.
    #[error("User {follower} is not following {followee}")]
    NotFollowing {
        /// Requesting user.
        follower: UserId,
        /// Target user.
        followee: UserId,
    },

    /// The storage layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FollowError {
    /// Stable surface code for the HTTP error body.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::AlreadyFollowing { .. } => "ALREADY_FOLLOWING",
            Self::NotFollowing { .. } => "NOT_FOLLOWING",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }
}

/// Errors raised by storage adapters.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// The underlying database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(String),

    /// A payload could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by message-log adapters.
#[derive(Error, Debug, Clone)]
pub enum LogError {
    /// Could not connect to the log.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A record could not be published.
    #[error("publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// Topic the publish targeted.
        topic: String,
        /// Broker or transport reason.
        reason: String,
    },

    /// A subscription could not be established.
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// Topic the subscription targeted.
        topic: String,
        /// Broker or transport reason.
        reason: String,
    },

    /// A received record could not be decoded.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The transport failed mid-stream.
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_codes_are_stable() {
        assert_eq!(ValidationError::UserIdEmpty.code(), "USER_ID_EMPTY");
        assert_eq!(
            ValidationError::UserIdInvalidFormat("x".into()).code(),
            "USER_ID_INVALID_FORMAT"
        );
        assert_eq!(ValidationError::EmptyContent.code(), "TWEET_CONTENT_EMPTY");
        assert_eq!(
            ValidationError::ContentTooLong { length: 300, max: 280 }.code(),
            "TWEET_CONTENT_TOO_LONG"
        );
        assert_eq!(ValidationError::SelfFollow.code(), "SELF_FOLLOW");
    }

    #[test]
    fn follow_error_codes() {
        let a = UserId::random();
        let b = UserId::random();
        assert_eq!(
            FollowError::AlreadyFollowing { follower: a, followee: b }.code(),
            "ALREADY_FOLLOWING"
        );
        assert_eq!(
            FollowError::NotFollowing { follower: a, followee: b }.code(),
            "NOT_FOLLOWING"
        );
        assert_eq!(
            FollowError::Validation(ValidationError::SelfFollow).code(),
            "SELF_FOLLOW"
        );
    }

    #[test]
    fn content_too_long_message_names_both_lengths() {
        let err = ValidationError::ContentTooLong { length: 281, max: 280 };
        let msg = err.to_string();
        assert!(msg.contains("280"));
        assert!(msg.contains("281"));
    }
}
