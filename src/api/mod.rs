mod auth;
mod bookings;
mod error;
mod rooms;

pub use error::ApiError;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::{header, HeaderMap};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Router;

use crate::auth::{Principal, SessionStore};
use crate::engine::Engine;
use crate::observability::{AUTH_FAILURES_TOTAL, REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub sessions: Arc<SessionStore>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/auth/user",
            get(auth::user_detail)
                .put(auth::user_update)
                .patch(auth::user_patch),
        )
        .route("/booking/room/", get(rooms::list).post(rooms::create))
        .route(
            "/booking/room/{id}",
            get(rooms::detail)
                .put(rooms::update)
                .patch(rooms::patch)
                .delete(rooms::destroy),
        )
        .route(
            "/booking/booking/",
            get(bookings::list).post(bookings::create),
        )
        .route(
            "/booking/booking/{id}",
            get(bookings::detail)
                .put(bookings::update)
                .patch(bookings::patch)
                .delete(bookings::destroy),
        )
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

/// Record request count and latency per matched endpoint.
async fn track_metrics(req: Request, next: Next) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    metrics::histogram!(
        REQUEST_DURATION_SECONDS,
        "endpoint" => endpoint.clone(),
        "method" => method.clone()
    )
    .record(start.elapsed().as_secs_f64());
    metrics::counter!(
        REQUESTS_TOTAL,
        "endpoint" => endpoint,
        "method" => method,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}

/// Resolve the caller. `Ok(None)` is an anonymous request (no Authorization
/// header); a header that does not resolve to a live session is 401.
fn principal(state: &AppState, headers: &HeaderMap) -> Result<Option<Principal>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
    match crate::auth::authenticate(&state.engine, &state.sessions, value) {
        Some(p) => Ok(Some(p)),
        None => {
            metrics::counter!(AUTH_FAILURES_TOTAL).increment(1);
            Err(ApiError::Unauthorized)
        }
    }
}

fn require_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let p = principal(state, headers)?;
    let authenticated = crate::access::ensure_authenticated(p.as_ref())?;
    Ok(authenticated.clone())
}
