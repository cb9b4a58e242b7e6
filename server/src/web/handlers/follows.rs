//! Follow-graph endpoints.

use crate::web::dto::{PageQuery, PageResponse, UserResponse};
use crate::web::error::ApiError;
use crate::web::handlers::{effective_limit, parse_path_user, require_self};
use crate::web::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chirp_core::RequestContext;

/// `POST /api/v1/users/{id}/follow/{target}`: the caller follows
/// `target`.
pub async fn follow(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((user_id, target_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let path_user = parse_path_user(&user_id, &ctx.request_id)?;
    require_self(&ctx, path_user, "follow from")?;
    let target = parse_path_user(&target_id, &ctx.request_id)?;

    state
        .follows
        .follow(&ctx, target)
        .await
        .map_err(|e| ApiError::follow(&e, &ctx.request_id))?;

    Ok(StatusCode::CREATED)
}

/// `DELETE /api/v1/users/{id}/follow/{target}`: the caller unfollows
/// `target`.
pub async fn unfollow(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path((user_id, target_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let path_user = parse_path_user(&user_id, &ctx.request_id)?;
    require_self(&ctx, path_user, "unfollow from")?;
    let target = parse_path_user(&target_id, &ctx.request_id)?;

    state
        .follows
        .unfollow(&ctx, target)
        .await
        .map_err(|e| ApiError::follow(&e, &ctx.request_id))?;

    Ok(StatusCode::OK)
}

/// `GET /api/v1/users/{id}/following`: page the users `id` follows.
pub async fn get_following(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<UserResponse>>, ApiError> {
    let user = parse_path_user(&user_id, &ctx.request_id)?;
    let limit = effective_limit(&state, query.limit);

    let page = state
        .follows
        .get_following(user, query.cursor.as_deref(), limit)
        .await
        .map_err(|e| ApiError::store(&e, &ctx.request_id))?;

    Ok(Json(PageResponse::from_page(page, UserResponse::from)))
}

/// `GET /api/v1/users/{id}/followers`: page the users following `id`.
pub async fn get_followers(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<UserResponse>>, ApiError> {
    let user = parse_path_user(&user_id, &ctx.request_id)?;
    let limit = effective_limit(&state, query.limit);

    let page = state
        .follows
        .get_followers(user, query.cursor.as_deref(), limit)
        .await
        .map_err(|e| ApiError::store(&e, &ctx.request_id))?;

    Ok(Json(PageResponse::from_page(page, UserResponse::from)))
}
