//! HTTP edge: application state, router and middleware wiring.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod identity;

pub use error::ApiError;
pub use identity::{identity_layer, RequestId, REQUEST_ID_HEADER, USER_ID_HEADER};

use crate::config::TimelineConfig;
use crate::service::{AdminService, FollowService, PostService, TimelineService};
use axum::routing::{get, post};
use axum::Router;
use chirp_core::shard::ShardRouter;
use chirp_core::store::UserStore;
use std::sync::Arc;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Post writes and author history.
    pub posts: Arc<PostService>,
    /// Follow-graph writes and listings.
    pub follows: Arc<FollowService>,
    /// Merged home timeline.
    pub timeline: Arc<TimelineService>,
    /// Demo stats/reset surface.
    pub admin: Arc<AdminService>,
    /// Caller provisioning in the identity middleware.
    pub users: Arc<dyn UserStore>,
    /// User-to-shard routing for request context.
    pub shard_router: ShardRouter,
    /// Page-size policy.
    pub timeline_config: TimelineConfig,
}

/// Build the complete router: resource routes wrapped in the identity
/// middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/actuator/health", get(handlers::health::health))
        .route("/api/v1/demo/stats", get(handlers::admin::stats))
        .route("/api/v1/demo/reset", post(handlers::admin::reset))
        .route("/api/v1/posts", post(handlers::posts::create_post))
        .route("/api/v1/users/:id/posts", get(handlers::posts::get_user_posts))
        .route(
            "/api/v1/users/:id/follow/:target",
            post(handlers::follows::follow).delete(handlers::follows::unfollow),
        )
        .route("/api/v1/users/:id/following", get(handlers::follows::get_following))
        .route("/api/v1/users/:id/followers", get(handlers::follows::get_followers))
        .route("/api/v1/users/:id/timeline", get(handlers::timeline::get_timeline))
        .layer(identity_layer(
            Arc::clone(&state.users),
            state.shard_router,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::AppMetrics;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chirp_core::id::IdGenerator;
    use chirp_core::model::UserId;
    use chirp_testing::{InMemoryDatabase, InMemoryTimelineCache};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = InMemoryDatabase::new();
        let cache = InMemoryTimelineCache::new(800);
        let ids = Arc::new(IdGenerator::new());
        let metrics = Arc::new(AppMetrics::new());
        let timeline_config = TimelineConfig::default();

        let state = AppState {
            posts: Arc::new(PostService::new(
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::clone(&ids),
                Arc::clone(&metrics),
            )),
            follows: Arc::new(FollowService::new(
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::clone(&ids),
                Arc::clone(&metrics),
            )),
            timeline: Arc::new(TimelineService::new(
                Arc::new(cache.clone()),
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                timeline_config.celebrity_follower_threshold,
                Arc::clone(&metrics),
            )),
            admin: Arc::new(AdminService::new(
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                Arc::new(cache),
                Arc::clone(&metrics),
            )),
            users: Arc::new(db),
            shard_router: ShardRouter::new(1),
            timeline_config,
        };
        build_router(state)
    }

    async fn send(
        router: &Router,
        request: Request<Body>,
    ) -> (StatusCode, Option<String>, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, request_id, json)
    }

    fn create_post_request(user: &str, content: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/posts")
            .header(USER_ID_HEADER, user)
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "content": content }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let router = test_router();
        let request = Request::builder()
            .uri("/actuator/health")
            .body(Body::empty())
            .unwrap();
        let (status, request_id, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
        assert!(request_id.is_some());
    }

    #[tokio::test]
    async fn missing_identity_is_401() {
        let router = test_router();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/posts")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"x"}"#))
            .unwrap();
        let (status, request_id, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHORIZED");
        assert_eq!(body["requestId"].as_str(), request_id.as_deref());
    }

    #[tokio::test]
    async fn malformed_identity_is_400() {
        let router = test_router();
        let (status, _, body) =
            send(&router, create_post_request("not-a-uuid", "hello")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "USER_ID_INVALID_FORMAT");
    }

    #[tokio::test]
    async fn create_post_returns_201_and_echoes_request_id() {
        let router = test_router();
        let user = UserId::random().to_string();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/posts")
            .header(USER_ID_HEADER, &user)
            .header(REQUEST_ID_HEADER, "client-req-9")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"  hello world  "}"#))
            .unwrap();

        let (status, request_id, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request_id.as_deref(), Some("client-req-9"));
        assert_eq!(body["content"], "hello world");
        assert_eq!(body["userId"], user);
    }

    #[tokio::test]
    async fn blank_content_is_400_with_surface_code() {
        let router = test_router();
        let user = UserId::random().to_string();
        let (status, _, body) = send(&router, create_post_request(&user, "   ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "TWEET_CONTENT_EMPTY");
    }

    #[tokio::test]
    async fn self_follow_is_400_and_duplicate_follow_is_409() {
        let router = test_router();
        let user = UserId::random().to_string();
        let target = UserId::random().to_string();

        let follow = |from: String, to: String| {
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/users/{from}/follow/{to}"))
                .header(USER_ID_HEADER, from.clone())
                .body(Body::empty())
                .unwrap()
        };

        let (status, _, body) = send(&router, follow(user.clone(), user.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "SELF_FOLLOW");

        let (status, _, _) = send(&router, follow(user.clone(), target.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _, body) = send(&router, follow(user, target)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "ALREADY_FOLLOWING");
    }

    #[tokio::test]
    async fn unfollow_without_edge_is_409() {
        let router = test_router();
        let user = UserId::random().to_string();
        let target = UserId::random().to_string();
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/users/{user}/follow/{target}"))
            .header(USER_ID_HEADER, &user)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "NOT_FOLLOWING");
    }

    #[tokio::test]
    async fn reading_another_users_timeline_is_403() {
        let router = test_router();
        let caller = UserId::random().to_string();
        let other = UserId::random().to_string();
        let request = Request::builder()
            .uri(format!("/api/v1/users/{other}/timeline"))
            .header(USER_ID_HEADER, &caller)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn own_timeline_starts_empty_with_page_envelope() {
        let router = test_router();
        let user = UserId::random().to_string();
        let request = Request::builder()
            .uri(format!("/api/v1/users/{user}/timeline"))
            .header(USER_ID_HEADER, &user)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!([]));
        assert_eq!(body["pagination"]["hasMore"], false);
        assert_eq!(body["pagination"]["nextCursor"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn demo_surface_needs_no_identity() {
        let router = test_router();

        // Create a user by posting once.
        let user = UserId::random().to_string();
        send(&router, create_post_request(&user, "hello")).await;

        let request = Request::builder()
            .uri("/api/v1/demo/stats")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"], 1);
        assert_eq!(body["posts"], 1);
        assert_eq!(body["pendingEvents"], 1);

        let reset = Request::builder()
            .method("POST")
            .uri("/api/v1/demo/reset")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, reset).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "reset_complete");
        assert_eq!(body["cleared"]["posts"], 1);
    }

    #[tokio::test]
    async fn follow_listings_render_user_pages() {
        let router = test_router();
        let user = UserId::random().to_string();
        let target = UserId::random().to_string();

        let follow = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/users/{user}/follow/{target}"))
            .header(USER_ID_HEADER, &user)
            .body(Body::empty())
            .unwrap();
        send(&router, follow).await;

        let request = Request::builder()
            .uri(format!("/api/v1/users/{user}/following"))
            .header(USER_ID_HEADER, &user)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], target);
        assert_eq!(body["pagination"]["hasMore"], false);
    }
}
