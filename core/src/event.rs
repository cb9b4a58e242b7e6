//! Domain events, wire payloads, and outbox records.
//!
//! Events are facts about committed state changes. They are written to
//! the outbox table in the same transaction as the state change, then
//! published to the message log keyed by their aggregate id so that all
//! events of one aggregate land on one partition in publish order.
//!
//! The wire payload is JSON and matches the established format exactly:
//! `POST_CREATED` carries `{eventId, tweetId, userId: {value}, content,
//! occurredAt}`; the follow events carry `{eventId, followerId: {value},
//! followeeId: {value}, occurredAt}`.

use crate::model::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire string for a created post.
pub const POST_CREATED: &str = "POST_CREATED";
/// Wire string for a new follow edge.
pub const USER_FOLLOWED: &str = "USER_FOLLOWED";
/// Wire string for a removed follow edge.
pub const USER_UNFOLLOWED: &str = "USER_UNFOLLOWED";

/// A domain event, tagged by the wire event type.
///
/// The aggregate id keys the log partition: the author for post events,
/// the follower for follow-graph events. That choice is what gives the
/// materializer per-author and per-reader ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A post was committed.
    PostCreated {
        /// Unique event id.
        event_id: Uuid,
        /// The new post.
        post_id: PostId,
        /// Author of the post.
        author: UserId,
        /// Trimmed content.
        content: String,
        /// Wall clock when the event was recorded.
        occurred_at: DateTime<Utc>,
    },
    /// A follow edge was committed.
    UserFollowed {
        /// Unique event id.
        event_id: Uuid,
        /// The user doing the following.
        follower: UserId,
        /// The user being followed.
        followee: UserId,
        /// Wall clock when the event was recorded.
        occurred_at: DateTime<Utc>,
    },
    /// A follow edge was removed.
    UserUnfollowed {
        /// Unique event id.
        event_id: Uuid,
        /// The user who unfollowed.
        follower: UserId,
        /// The user who lost a follower.
        followee: UserId,
        /// Wall clock when the event was recorded.
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// A `POST_CREATED` event stamped with the current wall clock.
    #[must_use]
    pub fn post_created(event_id: Uuid, post_id: PostId, author: UserId, content: String) -> Self {
        Self::PostCreated { event_id, post_id, author, content, occurred_at: Utc::now() }
    }

    /// A `USER_FOLLOWED` event stamped with the current wall clock.
    #[must_use]
    pub fn user_followed(event_id: Uuid, follower: UserId, followee: UserId) -> Self {
        Self::UserFollowed { event_id, follower, followee, occurred_at: Utc::now() }
    }

    /// A `USER_UNFOLLOWED` event stamped with the current wall clock.
    #[must_use]
    pub fn user_unfollowed(event_id: Uuid, follower: UserId, followee: UserId) -> Self {
        Self::UserUnfollowed { event_id, follower, followee, occurred_at: Utc::now() }
    }

    /// The wire discriminator.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::PostCreated { .. } => POST_CREATED,
            Self::UserFollowed { .. } => USER_FOLLOWED,
            Self::UserUnfollowed { .. } => USER_UNFOLLOWED,
        }
    }

    /// Unique id of this event.
    #[must_use]
    pub const fn event_id(&self) -> Uuid {
        match self {
            Self::PostCreated { event_id, .. }
            | Self::UserFollowed { event_id, .. }
            | Self::UserUnfollowed { event_id, .. } => *event_id,
        }
    }

    /// The aggregate that keys the log partition.
    #[must_use]
    pub fn aggregate_id(&self) -> String {
        match self {
            Self::PostCreated { author, .. } => author.to_string(),
            Self::UserFollowed { follower, .. } | Self::UserUnfollowed { follower, .. } => {
                follower.to_string()
            }
        }
    }

    /// When the event was recorded.
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::PostCreated { occurred_at, .. }
            | Self::UserFollowed { occurred_at, .. }
            | Self::UserUnfollowed { occurred_at, .. } => *occurred_at,
        }
    }

    /// Serialize the wire payload.
    ///
    /// # Errors
    ///
    /// Propagates the underlying JSON error; with these payloads that
    /// only happens on allocation failure.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::PostCreated { event_id, post_id, author, content, occurred_at } => {
                serde_json::to_string(&PostCreatedPayload {
                    event_id: *event_id,
                    tweet_id: post_id.as_uuid(),
                    user_id: UserIdRef { value: author.as_uuid() },
                    content: content.clone(),
                    occurred_at: *occurred_at,
                })
            }
            Self::UserFollowed { event_id, follower, followee, occurred_at }
            | Self::UserUnfollowed { event_id, follower, followee, occurred_at } => {
                serde_json::to_string(&FollowEdgePayload {
                    event_id: *event_id,
                    follower_id: UserIdRef { value: follower.as_uuid() },
                    followee_id: UserIdRef { value: followee.as_uuid() },
                    occurred_at: *occurred_at,
                })
            }
        }
    }
}

/// A user id as it appears inside wire payloads: `{"value": "..."}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserIdRef {
    /// The canonical UUID.
    pub value: Uuid,
}

/// Wire payload of a `POST_CREATED` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreatedPayload {
    /// Unique event id.
    pub event_id: Uuid,
    /// Id of the created post.
    pub tweet_id: Uuid,
    /// Author.
    pub user_id: UserIdRef,
    /// Trimmed content.
    pub content: String,
    /// Event wall clock.
    pub occurred_at: DateTime<Utc>,
}

/// Wire payload of a `USER_FOLLOWED` / `USER_UNFOLLOWED` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowEdgePayload {
    /// Unique event id.
    pub event_id: Uuid,
    /// The follower side of the edge.
    pub follower_id: UserIdRef,
    /// The followee side of the edge.
    pub followee_id: UserIdRef,
    /// Event wall clock.
    pub occurred_at: DateTime<Utc>,
}

/// A row of the transactional outbox.
///
/// `processed_at = None` means undelivered. Once set it is never
/// cleared, and after the retention window the row is compacted away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    /// Primary key; also published as the `eventId` header.
    pub id: Uuid,
    /// Wire discriminator.
    pub event_type: String,
    /// Partition key for the log.
    pub aggregate_id: String,
    /// JSON wire payload.
    pub payload: String,
    /// Request id captured from the originating request, if any.
    pub request_id: Option<String>,
    /// When the row was written (= event `occurred_at`).
    pub created_at: DateTime<Utc>,
    /// When the dispatcher marked the row delivered.
    pub processed_at: Option<DateTime<Utc>>,
}

/// Headers attached to every log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeaders {
    /// Wire discriminator, e.g. `POST_CREATED`.
    pub event_type: String,
    /// Canonical id of the originating outbox record.
    pub event_id: String,
    /// Propagated request id, if the write carried one.
    pub request_id: Option<String>,
}

/// One record on the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Partition key (canonical aggregate user-id string).
    pub key: String,
    /// JSON wire payload.
    pub payload: String,
    /// Tracing and routing headers.
    pub headers: RecordHeaders,
}

impl LogRecord {
    /// Build the log record for an outbox row.
    #[must_use]
    pub fn from_outbox(record: &OutboxRecord) -> Self {
        Self {
            key: record.aggregate_id.clone(),
            payload: record.payload.clone(),
            headers: RecordHeaders {
                event_type: record.event_type.clone(),
                event_id: record.id.to_string(),
                request_id: record.request_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_created_payload_matches_wire_shape() {
        let author = UserId::random();
        let post_id = PostId::from_uuid(Uuid::new_v4());
        let event = DomainEvent::post_created(Uuid::new_v4(), post_id, author, "hi".into());

        let json: serde_json::Value =
            serde_json::from_str(&event.payload_json().unwrap()).unwrap();

        assert_eq!(json["tweetId"], post_id.to_string());
        assert_eq!(json["userId"]["value"], author.to_string());
        assert_eq!(json["content"], "hi");
        assert!(json["occurredAt"].is_string());
    }

    #[test]
    fn follow_payload_nests_both_ids() {
        let follower = UserId::random();
        let followee = UserId::random();
        let event = DomainEvent::user_followed(Uuid::new_v4(), follower, followee);

        let json: serde_json::Value =
            serde_json::from_str(&event.payload_json().unwrap()).unwrap();

        assert_eq!(json["followerId"]["value"], follower.to_string());
        assert_eq!(json["followeeId"]["value"], followee.to_string());
    }

    #[test]
    fn aggregate_is_author_for_posts_and_follower_for_edges() {
        let author = UserId::random();
        let follower = UserId::random();
        let followee = UserId::random();

        let posted = DomainEvent::post_created(
            Uuid::new_v4(),
            PostId::from_uuid(Uuid::new_v4()),
            author,
            "x".into(),
        );
        assert_eq!(posted.aggregate_id(), author.to_string());

        let followed = DomainEvent::user_followed(Uuid::new_v4(), follower, followee);
        assert_eq!(followed.aggregate_id(), follower.to_string());

        let unfollowed = DomainEvent::user_unfollowed(Uuid::new_v4(), follower, followee);
        assert_eq!(unfollowed.aggregate_id(), follower.to_string());
    }

    #[test]
    fn log_record_copies_outbox_headers() {
        let record = OutboxRecord {
            id: Uuid::new_v4(),
            event_type: POST_CREATED.to_string(),
            aggregate_id: UserId::random().to_string(),
            payload: "{}".to_string(),
            request_id: Some("req-1".to_string()),
            created_at: Utc::now(),
            processed_at: None,
        };

        let msg = LogRecord::from_outbox(&record);
        assert_eq!(msg.key, record.aggregate_id);
        assert_eq!(msg.headers.event_type, POST_CREATED);
        assert_eq!(msg.headers.event_id, record.id.to_string());
        assert_eq!(msg.headers.request_id.as_deref(), Some("req-1"));
    }
}
