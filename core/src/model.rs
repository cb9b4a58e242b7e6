//! Domain value objects and entities.
//!
//! Identifiers are 128-bit values. [`UserId`] wraps an opaque UUID;
//! [`PostId`] wraps a UUIDv7 whose high 48 bits are the creation
//! timestamp in milliseconds, so lexicographic byte order equals
//! chronological order. Constructors that can fail with an expected
//! business outcome return `Result` with a [`ValidationError`]; trusted
//! inputs (our own database, our own messages) use the `from_trusted`
//! constructors, which treat corruption as a hard error.

use crate::error::ValidationError;
use crate::id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a user.
///
/// The external representation is the canonical 36-character hyphenated
/// form; parsing accepts exactly that and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Parse an externally supplied id.
    ///
    /// # Errors
    ///
    /// [`ValidationError::UserIdEmpty`] for empty/blank input,
    /// [`ValidationError::UserIdInvalidFormat`] for anything that is not
    /// a canonical UUID.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::UserIdEmpty);
        }
        Uuid::try_parse(trimmed)
            .map(Self)
            .map_err(|_| ValidationError::UserIdInvalidFormat(value.to_string()))
    }

    /// Construct from a value that originated inside the system (own
    /// database rows, own message keys).
    ///
    /// # Errors
    ///
    /// Returns the raw string when it is not a UUID. Callers treat this
    /// as data corruption, not as user error.
    pub fn from_trusted(value: &str) -> Result<Self, String> {
        Uuid::try_parse(value)
            .map(Self)
            .map_err(|_| format!("corrupted user id in trusted source: {value}"))
    }

    /// Wrap an already-validated UUID.
    #[must_use]
    pub const fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// A random id, for tests and placeholder users.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The raw UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a post.
///
/// Time-ordered: the embedded millisecond timestamp defines the
/// chronological (and therefore timeline) order of posts. Comparing two
/// `PostId`s compares their raw bits, which is a valid chronological
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(Uuid);

impl PostId {
    /// Wrap a freshly minted or stored id.
    #[must_use]
    pub const fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parse the canonical hyphenated form (cursor decoding, trusted rows).
    ///
    /// # Errors
    ///
    /// Returns the raw string when it is not a UUID.
    pub fn from_trusted(value: &str) -> Result<Self, String> {
        Uuid::try_parse(value)
            .map(Self)
            .map_err(|_| format!("corrupted post id in trusted source: {value}"))
    }

    /// The raw UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Milliseconds since the Unix epoch embedded in the id.
    ///
    /// This is the canonical timeline order key: the cache score, the
    /// cursor bound and the merge order all derive from it, never from
    /// the stored `created_at`.
    #[must_use]
    pub fn timestamp_ms(&self) -> i64 {
        id::extract_timestamp_ms(self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered (or placeholder) user.
///
/// Users are created implicitly: by the identity middleware on first
/// request, or as a placeholder when someone follows an id that has
/// never posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct User {
    /// Identity.
    pub id: UserId,
    /// First time the system saw this user.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A user record stamped with the current wall clock.
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self { id, created_at: Utc::now() }
    }
}

/// Maximum post length in Unicode code points, measured after trimming.
pub const MAX_CONTENT_LENGTH: usize = 280;

/// An immutable short message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Time-ordered identity.
    pub id: PostId,
    /// Author.
    pub author: UserId,
    /// Trimmed content.
    pub content: String,
    /// Wall clock at creation. Display metadata; ordering uses
    /// [`PostId::timestamp_ms`].
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Validate content and assemble a post.
    ///
    /// Content is trimmed of leading/trailing whitespace; the trimmed
    /// form must be non-empty and at most [`MAX_CONTENT_LENGTH`] code
    /// points.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyContent`] or
    /// [`ValidationError::ContentTooLong`].
    pub fn create(id: PostId, author: UserId, content: &str) -> Result<Self, ValidationError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        let length = trimmed.chars().count();
        if length > MAX_CONTENT_LENGTH {
            return Err(ValidationError::ContentTooLong { length, max: MAX_CONTENT_LENGTH });
        }
        Ok(Self {
            id,
            author,
            content: trimmed.to_string(),
            created_at: Utc::now(),
        })
    }
}

/// A directed follow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Follow {
    /// The user doing the following.
    pub follower: UserId,
    /// The user being followed.
    pub followee: UserId,
    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

impl Follow {
    /// Validate and assemble a follow edge.
    ///
    /// # Errors
    ///
    /// [`ValidationError::SelfFollow`] when follower and followee are
    /// the same user.
    pub fn create(follower: UserId, followee: UserId) -> Result<Self, ValidationError> {
        if follower == followee {
            return Err(ValidationError::SelfFollow);
        }
        Ok(Self { follower, followee, created_at: Utc::now() })
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page, already in final order.
    pub items: Vec<T>,
    /// Opaque cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// An empty final page.
    #[must_use]
    pub const fn empty() -> Self {
        Self { items: Vec::new(), next_cursor: None }
    }

    /// Whether more pages follow.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }

    /// Cut an over-fetched result down to `limit` items.
    ///
    /// Callers fetch `limit + 1` rows to detect the end of the listing;
    /// when more than `limit` arrived the excess is dropped and
    /// `cursor_of` derives the next cursor from the last retained item.
    #[must_use]
    pub fn clip(mut items: Vec<T>, limit: usize, cursor_of: impl Fn(&T) -> String) -> Self {
        if items.len() > limit {
            items.truncate(limit);
            let next_cursor = items.last().map(&cursor_of);
            Self { items, next_cursor }
        } else {
            Self { items, next_cursor: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_parse_rejects_blank() {
        assert_eq!(UserId::parse(""), Err(ValidationError::UserIdEmpty));
        assert_eq!(UserId::parse("   "), Err(ValidationError::UserIdEmpty));
    }

    #[test]
    fn user_id_parse_rejects_garbage() {
        assert!(matches!(
            UserId::parse("not-a-uuid"),
            Err(ValidationError::UserIdInvalidFormat(_))
        ));
    }

    #[test]
    fn user_id_round_trips_canonical_form() {
        let id = UserId::random();
        let parsed = UserId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn post_create_trims_content() {
        let id = PostId::from_uuid(Uuid::new_v4());
        let post = Post::create(id, UserId::random(), "  hello world  ").unwrap();
        assert_eq!(post.content, "hello world");
    }

    #[test]
    fn post_create_rejects_whitespace_only() {
        let id = PostId::from_uuid(Uuid::new_v4());
        assert_eq!(
            Post::create(id, UserId::random(), " \t\n "),
            Err(ValidationError::EmptyContent)
        );
    }

    #[test]
    fn post_create_counts_code_points_not_bytes() {
        let id = PostId::from_uuid(Uuid::new_v4());
        // 280 two-byte code points: fits even though it is 560 bytes.
        let content: String = "é".repeat(280);
        assert!(Post::create(id, UserId::random(), &content).is_ok());

        let too_long: String = "é".repeat(281);
        assert_eq!(
            Post::create(id, UserId::random(), &too_long),
            Err(ValidationError::ContentTooLong { length: 281, max: 280 })
        );
    }

    #[test]
    fn post_length_is_measured_after_trimming() {
        let id = PostId::from_uuid(Uuid::new_v4());
        let content = format!("  {}  ", "x".repeat(280));
        assert!(Post::create(id, UserId::random(), &content).is_ok());
    }

    #[test]
    fn follow_rejects_self() {
        let user = UserId::random();
        assert_eq!(Follow::create(user, user), Err(ValidationError::SelfFollow));
    }

    #[test]
    fn page_clip_under_limit_has_no_cursor() {
        let page = Page::clip(vec![1, 2, 3], 5, |n| n.to_string());
        assert_eq!(page.items, vec![1, 2, 3]);
        assert!(!page.has_more());
    }

    #[test]
    fn page_clip_over_limit_drops_excess_and_points_at_last_kept() {
        let page = Page::clip(vec![5, 4, 3, 2], 3, |n| n.to_string());
        assert_eq!(page.items, vec![5, 4, 3]);
        assert_eq!(page.next_cursor.as_deref(), Some("3"));
        assert!(page.has_more());
    }

    #[test]
    fn page_clip_exact_limit_is_final() {
        let page = Page::clip(vec![1, 2], 2, |n| n.to_string());
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more());
    }
}
