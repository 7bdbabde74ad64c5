//! Throttle Middleware
//!
//! Per-route wrappers around the use cases. Mounted via
//! `axum::middleware::from_fn` with a cloned state:
//!
//! ```ignore
//! let state = RateLimitState { use_case, bucket: Bucket::TradeCreate };
//! router.layer(middleware::from_fn(move |req, next| {
//!     enforce_rate_limit(state.clone(), req, next)
//! }));
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::application::idempotency::IdempotencyGuard;
use crate::application::rate_limit::RateLimitUseCase;
use crate::domain::entities::CachedResponse;
use crate::domain::repository::{IdempotencyRepository, RateLimitRepository};
use crate::domain::value_objects::Bucket;
use crate::error::ThrottleError;
use crate::presentation::extract::{idempotency_key, resolve_actor};

/// Rate limit middleware state, one per protected route
#[derive(Clone)]
pub struct RateLimitState<R>
where
    R: RateLimitRepository + Clone + Send + Sync + 'static,
{
    pub use_case: Arc<RateLimitUseCase<R>>,
    pub bucket: Bucket,
}

/// Middleware enforcing the route's bucket quota.
///
/// Denial terminates the request with 429, `Retry-After` and the
/// `X-RateLimit-*` headers; an allowed request passes through untouched.
pub async fn enforce_rate_limit<R>(
    state: RateLimitState<R>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Response>
where
    R: RateLimitRepository + Clone + Send + Sync + 'static,
{
    let actor = resolve_actor(&req);

    match state.use_case.require(&actor, state.bucket).await {
        Ok(_) => Ok(next.run(req).await),
        Err(e) => Err(e.into_response()),
    }
}

/// Idempotency middleware state
#[derive(Clone)]
pub struct IdempotencyState<R>
where
    R: IdempotencyRepository + Clone + Send + Sync + 'static,
{
    pub guard: Arc<IdempotencyGuard<R>>,
}

/// Middleware replaying or rejecting duplicate mutating requests.
///
/// A request without an `Idempotency-Key` header runs unprotected. With
/// one, the body is buffered, the key reserved, and the inner handler
/// runs at most once; its status and body are cached for replays.
pub async fn idempotency_gate<R>(
    state: IdempotencyState<R>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, Response>
where
    R: IdempotencyRepository + Clone + Send + Sync + 'static,
{
    let Some(client_key) = idempotency_key(req.headers()) else {
        return Ok(next.run(req).await);
    };

    let actor = resolve_actor(&req);
    let endpoint = format!("{} {}", req.method(), req.uri().path());
    let max_body_bytes = state.guard.config().max_body_bytes;

    let (parts, body) = req.into_parts();
    let payload = match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err(ThrottleError::PayloadTooLarge {
                limit_bytes: max_body_bytes,
            }
            .into_response());
        }
    };

    let request_bytes = payload.clone();
    let result = state
        .guard
        .execute(&actor, &endpoint, &client_key, &payload, move || async move {
            let req = Request::from_parts(parts, Body::from(request_bytes));
            let response = next.run(req).await;

            let (response_parts, response_body) = response.into_parts();
            let body = axum::body::to_bytes(response_body, usize::MAX)
                .await
                .map_err(|e| {
                    ThrottleError::Internal(format!("failed to buffer response: {}", e))
                })?;

            Ok(CachedResponse {
                status_code: response_parts.status.as_u16(),
                body: body.to_vec(),
            })
        })
        .await;

    match result {
        Ok(cached) => Ok(cached_response(cached)),
        Err(e) => Err(e.into_response()),
    }
}

/// Render a snapshot. Both the first execution and every replay pass
/// through here, so the bytes on the wire are identical.
fn cached_response(cached: CachedResponse) -> Response {
    let status =
        StatusCode::from_u16(cached.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        cached.body,
    )
        .into_response()
}
