//! Pagination cursor codecs.
//!
//! Post cursors are base-64 of the canonical post-id string; follow
//! cursors are the ISO-8601 instant of the previous page's last edge.
//! Invalid cursors are treated as absent (first page) rather than
//! rejected, matching the established API behavior.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chirp_core::model::PostId;
use chrono::{DateTime, Utc};

/// Encode a post id as an opaque cursor.
#[must_use]
pub fn encode_post_cursor(id: PostId) -> String {
    BASE64.encode(id.to_string())
}

/// Decode a post cursor; `None` for missing or malformed input.
#[must_use]
pub fn decode_post_cursor(cursor: Option<&str>) -> Option<PostId> {
    let cursor = cursor?.trim();
    if cursor.is_empty() {
        return None;
    }
    let bytes = BASE64.decode(cursor).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    match PostId::from_trusted(&text) {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(cursor, "Invalid post cursor, treating as first page");
            None
        }
    }
}

/// Encode a follow-edge timestamp as a cursor.
#[must_use]
pub fn encode_follow_cursor(followed_at: DateTime<Utc>) -> String {
    followed_at.to_rfc3339()
}

/// Decode a follow cursor; `None` for missing or malformed input.
#[must_use]
pub fn decode_follow_cursor(cursor: Option<&str>) -> Option<DateTime<Utc>> {
    let cursor = cursor?.trim();
    if cursor.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(cursor) {
        Ok(instant) => Some(instant.with_timezone(&Utc)),
        Err(_) => {
            tracing::warn!(cursor, "Invalid follow cursor, treating as first page");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn post_cursor_round_trips() {
        let id = PostId::from_uuid(Uuid::new_v4());
        let cursor = encode_post_cursor(id);
        assert_eq!(decode_post_cursor(Some(&cursor)), Some(id));
    }

    #[test]
    fn invalid_post_cursors_mean_first_page() {
        assert_eq!(decode_post_cursor(None), None);
        assert_eq!(decode_post_cursor(Some("")), None);
        assert_eq!(decode_post_cursor(Some("!!not-base64!!")), None);
        // Valid base64 of something that is not a UUID.
        assert_eq!(decode_post_cursor(Some(&BASE64.encode("hello"))), None);
    }

    #[test]
    fn follow_cursor_round_trips_exactly() {
        let now = Utc::now();
        let cursor = encode_follow_cursor(now);
        assert_eq!(decode_follow_cursor(Some(&cursor)), Some(now));
    }

    #[test]
    fn invalid_follow_cursors_mean_first_page() {
        assert_eq!(decode_follow_cursor(Some("yesterday")), None);
        assert_eq!(decode_follow_cursor(Some("")), None);
    }
}
