//! Home-timeline endpoint.

use crate::web::dto::{PageQuery, PageResponse, PostResponse};
use crate::web::error::ApiError;
use crate::web::handlers::{effective_limit, parse_path_user, require_self};
use crate::web::AppState;
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chirp_core::RequestContext;

/// `GET /api/v1/users/{id}/timeline`: the caller's merged home
/// timeline. Readable only by its owner.
pub async fn get_timeline(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<PostResponse>>, ApiError> {
    let path_user = parse_path_user(&user_id, &ctx.request_id)?;
    require_self(&ctx, path_user, "view the timeline of")?;
    let limit = effective_limit(&state, query.limit);

    let page = state
        .timeline
        .get_timeline(ctx.user_id, query.cursor.as_deref(), limit)
        .await
        .map_err(|e| ApiError::store(&e, &ctx.request_id))?;

    Ok(Json(PageResponse::from_page(page, PostResponse::from)))
}
