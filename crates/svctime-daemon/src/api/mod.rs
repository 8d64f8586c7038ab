//! HTTP routing.
//!
//! The process serves one protocol generation under its prefix
//! (`/api/v1` or `/api/v2`). Only the tracking socket is a real axum route;
//! every other request goes through [`dispatch`], which strips the prefix and
//! hands the remainder to the generation's dispatcher. Each dispatcher
//! classifies the route, checks credentials, and only then touches the store.
//! Anything it does not recognize gets the generic `{"status":"not found"}`.

pub mod v1;
pub mod v2;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use svctime_core::ApiVersion;
use tracing::debug;

use crate::error::{ApiError, NEW_NAME_REQUIRED};
use crate::session;
use crate::state::AppState;

/// Builds the router for the generation selected in `state`.
pub fn router(state: AppState) -> Router {
    let track = format!("{}/ws/track", state.api_version().prefix());
    Router::new()
        .route(&track, get(session::track).fallback(no_route))
        .fallback(dispatch)
        .with_state(state)
}

async fn no_route() -> ApiError {
    ApiError::NoRoute
}

async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let version = state.api_version();
    let Some(rest) = strip_prefix(uri.path(), version.prefix()) else {
        return ApiError::NoRoute.into_response();
    };
    debug!(%method, path = rest, %version, "dispatching request");

    let request = Request {
        method: &method,
        rest,
        headers: &headers,
        body: &body,
    };
    let result = match version {
        ApiVersion::V1 => v1::dispatch(&state, &request),
        ApiVersion::V2 => v2::dispatch(&state, &request),
    };
    result.unwrap_or_else(IntoResponse::into_response)
}

/// The parts of a request the dispatchers look at.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: &'a Method,
    /// Raw (still percent-encoded) path after the version prefix.
    pub rest: &'a str,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// `/api/v2/time` yields `/time`; `/api/v2time` yields nothing.
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// `{"status":"ok"}`, also the health check body.
pub(crate) fn ok() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

pub(crate) fn created() -> Response {
    (StatusCode::CREATED, Json(json!({ "status": "created" }))).into_response()
}

pub(crate) fn time(counter: u64) -> Response {
    (StatusCode::OK, Json(json!({ "time": counter.to_string() }))).into_response()
}

/// Extracts a non-empty string `new_name` from a JSON body.
pub(crate) fn new_name(body: &[u8]) -> Result<String, ApiError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| ApiError::BadRequest(NEW_NAME_REQUIRED))?;
    match value.get("new_name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Ok(name.to_owned()),
        _ => Err(ApiError::BadRequest(NEW_NAME_REQUIRED)),
    }
}
