//! HTTP error mapping.
//!
//! Bridges the domain's tagged errors to responses. Every error body
//! has the same shape: `{error, message, requestId}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chirp_core::error::{FollowError, PostError, StoreError, ValidationError};
use serde::Serialize;

/// An error ready to be rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
    request_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    message: String,
    request_id: Option<String>,
}

impl ApiError {
    /// An error with an explicit status and surface code.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// 401 with the `UNAUTHORIZED` code.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 403 with the `FORBIDDEN` code.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 500 with the `INTERNAL_ERROR` code and a generic message.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An unexpected error occurred",
        )
    }

    /// Attach the request id echoed in the body.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Map a validation failure to its 400 response.
    #[must_use]
    pub fn validation(err: &ValidationError, request_id: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, err.code(), err.to_string())
            .with_request_id(request_id)
    }

    /// Map a post-service failure.
    #[must_use]
    pub fn post(err: &PostError, request_id: &str) -> Self {
        match err {
            PostError::Validation(e) => Self::validation(e, request_id),
            PostError::Store(e) => Self::store(e, request_id),
        }
    }

    /// Map a follow-service failure.
    #[must_use]
    pub fn follow(err: &FollowError, request_id: &str) -> Self {
        match err {
            FollowError::Validation(e) => Self::validation(e, request_id),
            FollowError::AlreadyFollowing { .. } | FollowError::NotFollowing { .. } => {
                Self::new(StatusCode::CONFLICT, err.code(), err.to_string())
                    .with_request_id(request_id)
            }
            FollowError::Store(e) => Self::store(e, request_id),
        }
    }

    /// Map a storage failure. The cause is logged, never exposed.
    #[must_use]
    pub fn store(err: &StoreError, request_id: &str) -> Self {
        tracing::error!(error = %err, request_id, "Storage failure");
        Self::internal().with_request_id(request_id)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        }
        let body = ErrorBody {
            error: self.code,
            message: self.message,
            request_id: self.request_id,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chirp_core::model::UserId;

    #[test]
    fn follow_conflicts_are_409() {
        let err = FollowError::AlreadyFollowing {
            follower: UserId::random(),
            followee: UserId::random(),
        };
        let api = ApiError::follow(&err, "r-1");
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, "ALREADY_FOLLOWING");
        assert_eq!(api.request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn validation_errors_are_400_with_their_code() {
        let api = ApiError::validation(&ValidationError::EmptyContent, "r-2");
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, "TWEET_CONTENT_EMPTY");
    }

    #[test]
    fn store_errors_hide_the_cause() {
        let api = ApiError::store(&StoreError::Database("secret dsn".into()), "r-3");
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("secret"));
    }
}
