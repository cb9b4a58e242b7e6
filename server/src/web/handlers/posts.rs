//! Post endpoints.

use crate::web::dto::{CreatePostRequest, PageQuery, PageResponse, PostResponse};
use crate::web::error::ApiError;
use crate::web::handlers::{effective_limit, parse_path_user};
use crate::web::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chirp_core::RequestContext;

/// `POST /api/v1/posts`: create a post for the caller.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let post = state
        .posts
        .create_post(&ctx, &request.content)
        .await
        .map_err(|e| ApiError::post(&e, &ctx.request_id))?;

    Ok((StatusCode::CREATED, Json(post.into())))
}

/// `GET /api/v1/users/{id}/posts`: page an author's history.
pub async fn get_user_posts(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<PostResponse>>, ApiError> {
    let author = parse_path_user(&user_id, &ctx.request_id)?;
    let limit = effective_limit(&state, query.limit);

    let page = state
        .posts
        .get_user_posts(author, query.cursor.as_deref(), limit)
        .await
        .map_err(|e| ApiError::post(&e, &ctx.request_id))?;

    Ok(Json(PageResponse::from_page(page, PostResponse::from)))
}
