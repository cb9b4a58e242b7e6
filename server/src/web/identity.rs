//! Caller identity and request-id middleware.
//!
//! The edge trusts `X-User-Id`: upstream infrastructure has already
//! authenticated the caller, this layer only validates the shape,
//! provisions the user row, and builds the [`RequestContext`] handlers
//! consume. `X-Request-Id` is taken from the caller or generated, is
//! echoed on every response, and travels through the outbox into the
//! log headers.
//!
//! The demo and health surfaces are public: they get a request id but
//! no identity.

use crate::web::error::ApiError;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chirp_core::model::{User, UserId};
use chirp_core::shard::ShardRouter;
use chirp_core::store::UserStore;
use chirp_core::RequestContext;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;

/// Header carrying the authenticated caller id.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header carrying the correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Paths served without caller identity.
const PUBLIC_PATH_PREFIXES: &[&str] = &["/actuator", "/api/v1/demo"];

/// The request id, available on public routes that have no
/// [`RequestContext`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Create the identity layer.
#[must_use]
pub fn identity_layer(users: Arc<dyn UserStore>, router: ShardRouter) -> IdentityLayer {
    IdentityLayer { users, router }
}

/// Layer wiring [`IdentityMiddleware`] around the router.
#[derive(Clone)]
pub struct IdentityLayer {
    users: Arc<dyn UserStore>,
    router: ShardRouter,
}

impl<S> Layer<S> for IdentityLayer {
    type Service = IdentityMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        IdentityMiddleware {
            inner,
            users: Arc::clone(&self.users),
            router: self.router,
        }
    }
}

/// Middleware service enforcing the identity contract.
#[derive(Clone)]
pub struct IdentityMiddleware<S> {
    inner: S,
    users: Arc<dyn UserStore>,
    router: ShardRouter,
}

impl<S> Service<Request> for IdentityMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let users = Arc::clone(&self.users);
        let router = self.router;
        // Swap in the clone so the original, ready service handles this
        // request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
                .unwrap_or_else(RequestContext::generate_request_id);

            req.extensions_mut().insert(RequestId(request_id.clone()));

            let path = req.uri().path().to_string();
            if is_public_path(&path) {
                let mut response = inner.call(req).await?;
                echo_request_id(&mut response, &request_id);
                return Ok(response);
            }

            let Some(header) = req
                .headers()
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
            else {
                tracing::warn!(path = %path, "Missing X-User-Id header");
                let mut response = ApiError::unauthorized(format!(
                    "Missing {USER_ID_HEADER} header"
                ))
                .with_request_id(&request_id)
                .into_response();
                echo_request_id(&mut response, &request_id);
                return Ok(response);
            };

            let user_id = match UserId::parse(header) {
                Ok(user_id) => user_id,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Invalid X-User-Id header");
                    let mut response =
                        ApiError::new(StatusCode::BAD_REQUEST, e.code(), e.to_string())
                            .with_request_id(&request_id)
                            .into_response();
                    echo_request_id(&mut response, &request_id);
                    return Ok(response);
                }
            };

            let shard = router.shard_for(user_id);

            // The caller exists from its first request onward, so every
            // later read (follow listings, timelines) can join on it.
            if let Err(e) = users.upsert_if_absent(&User::new(user_id)).await {
                tracing::error!(error = %e, user_id = %user_id, "Failed to provision caller");
                let mut response = ApiError::internal()
                    .with_request_id(&request_id)
                    .into_response();
                echo_request_id(&mut response, &request_id);
                return Ok(response);
            }

            let span = tracing::info_span!(
                "http_request",
                method = %req.method(),
                path = %path,
                user_id = %user_id,
                request_id = %request_id,
                shard,
            );

            req.extensions_mut()
                .insert(RequestContext::new(user_id, request_id.clone(), shard));

            let mut response = inner.call(req).instrument(span).await?;
            echo_request_id(&mut response, &request_id);
            Ok(response)
        })
    }
}

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn echo_request_id(response: &mut Response, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_paths_skip_identity() {
        assert!(is_public_path("/actuator/health"));
        assert!(is_public_path("/api/v1/demo/stats"));
        assert!(is_public_path("/api/v1/demo/reset"));
        assert!(!is_public_path("/api/v1/posts"));
        assert!(!is_public_path("/api/v1/users/x/timeline"));
    }
}
