//! HTTP handlers, grouped by resource.

pub mod admin;
pub mod follows;
pub mod health;
pub mod posts;
pub mod timeline;

use crate::web::error::ApiError;
use crate::web::AppState;
use axum::http::StatusCode;
use chirp_core::model::UserId;
use chirp_core::RequestContext;

/// Parse a path user id, surfacing the validation code on failure.
pub(crate) fn parse_path_user(value: &str, request_id: &str) -> Result<UserId, ApiError> {
    UserId::parse(value).map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, e.code(), e.to_string()).with_request_id(request_id)
    })
}

/// Reject requests where the path user is not the authenticated caller.
pub(crate) fn require_self(
    ctx: &RequestContext,
    path_user: UserId,
    action: &str,
) -> Result<(), ApiError> {
    if ctx.user_id == path_user {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("You can only {action} your own account"))
            .with_request_id(&ctx.request_id))
    }
}

/// Clamp a requested page size to the configured bounds.
pub(crate) fn effective_limit(state: &AppState, requested: Option<usize>) -> usize {
    requested
        .map(|limit| limit.min(state.timeline_config.max_page_size).max(1))
        .unwrap_or(state.timeline_config.default_page_size)
}
