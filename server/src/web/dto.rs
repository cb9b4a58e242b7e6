//! Request and response bodies.

use chirp_core::model::{Page, Post};
use chirp_core::store::FollowedUser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/posts`.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    /// Raw post content; trimmed and validated by the service.
    pub content: String,
}

/// Common pagination query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Opaque cursor from the previous page.
    pub cursor: Option<String>,
    /// Requested page size; clamped server-side.
    pub limit: Option<usize>,
}

/// A post as rendered to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    /// Canonical post id.
    pub id: String,
    /// Canonical author id.
    pub user_id: String,
    /// Trimmed content.
    pub content: String,
    /// Creation wall clock.
    pub created_at: DateTime<Utc>,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id.to_string(),
            user_id: post.author.to_string(),
            content: post.content,
            created_at: post.created_at,
        }
    }
}

/// A user in a follow listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// Canonical user id.
    pub id: String,
    /// When the system first saw the user.
    pub created_at: DateTime<Utc>,
}

impl From<FollowedUser> for UserResponse {
    fn from(edge: FollowedUser) -> Self {
        Self {
            id: edge.user.id.to_string(),
            created_at: edge.user.created_at,
        }
    }
}

/// Pagination envelope metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Cursor for the next page, absent on the last page.
    pub next_cursor: Option<String>,
    /// Whether more pages follow.
    pub has_more: bool,
}

/// Standard list envelope: `{data, pagination}`.
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    /// Items of this page.
    pub data: Vec<T>,
    /// Cursor metadata.
    pub pagination: Pagination,
}

impl<T> PageResponse<T> {
    /// Render a domain page through a per-item mapping.
    pub fn from_page<S>(page: Page<S>, map: impl Fn(S) -> T) -> Self {
        let has_more = page.has_more();
        Self {
            data: page.items.into_iter().map(map).collect(),
            pagination: Pagination { next_cursor: page.next_cursor, has_more },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_envelope_is_camel_case() {
        let page = Page { items: vec![1, 2], next_cursor: Some("abc".to_string()) };
        let body = PageResponse::from_page(page, |n| n);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert_eq!(json["pagination"]["nextCursor"], "abc");
        assert_eq!(json["pagination"]["hasMore"], true);
    }
}
