//! Hierarchical service API (`/api/v2`).
//!
//! | Method | Path | Store call |
//! |---|---|---|
//! | GET | `/health` | none, no auth |
//! | GET | `/time` | `full_tree` |
//! | GET | `/time/<path>` | `counter` |
//! | GET | `/tree/<path>` | `subtree` |
//! | POST | `/service/<path>` | `create` |
//! | PUT | `/service/<path>` | `rename` |
//! | DELETE | `/service/<path>` | `delete` |
//!
//! `<path>` is percent-decoded as a whole and then split on `/`. A rename's
//! `new_name` must therefore be a single segment.

use axum::Json;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use svctime_core::ServicePath;

use super::{Request, created, new_name, ok, time};
use crate::auth::authorize;
use crate::error::{ApiError, NEW_NAME_SEGMENT, PATH_REQUIRED, SERVICE_MISSING};
use crate::state::AppState;

/// Recognized route families. The payload is the raw path remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    TimeAll,
    Time(&'a str),
    Tree(&'a str),
    Service(&'a str),
}

fn classify(rest: &str) -> Option<Route<'_>> {
    if rest == "/time" {
        return Some(Route::TimeAll);
    }
    if let Some(raw) = rest.strip_prefix("/time/") {
        return Some(Route::Time(raw));
    }
    if let Some(raw) = rest.strip_prefix("/tree/") {
        return Some(Route::Tree(raw));
    }
    rest.strip_prefix("/service/").map(Route::Service)
}

/// Decodes a route remainder, rejecting the empty path with `err`.
fn required_path(raw: &str, err: ApiError) -> Result<ServicePath, ApiError> {
    let path = ServicePath::from_encoded(raw);
    if path.is_empty() { Err(err) } else { Ok(path) }
}

pub fn dispatch(state: &AppState, req: &Request<'_>) -> Result<Response, ApiError> {
    if *req.method == Method::GET && req.rest == "/health" {
        return Ok(ok());
    }
    let route = classify(req.rest).ok_or(ApiError::NoRoute)?;
    authorize(req.headers, state.credentials())?;

    let store = state.store();
    match (req.method, route) {
        (&Method::GET, Route::TimeAll) => {
            let services = store.full_tree()?;
            Ok(Json(json!({ "services": services })).into_response())
        },
        (&Method::GET, Route::Time(raw)) => {
            let path = required_path(raw, ApiError::NotFound(SERVICE_MISSING))?;
            Ok(time(store.counter(&path)?))
        },
        (&Method::GET, Route::Tree(raw)) => {
            let path = required_path(raw, ApiError::NotFound(PATH_REQUIRED))?;
            Ok(Json(store.subtree(&path)?).into_response())
        },
        (&Method::POST, Route::Service(raw)) => {
            let path = required_path(raw, ApiError::BadRequest(PATH_REQUIRED))?;
            store.create(&path)?;
            Ok(created())
        },
        (&Method::PUT, Route::Service(raw)) => {
            let new_name = new_name(req.body)?;
            if new_name.contains('/') {
                return Err(ApiError::BadRequest(NEW_NAME_SEGMENT));
            }
            let path = required_path(raw, ApiError::BadRequest(PATH_REQUIRED))?;
            store.rename(&path, &new_name)?;
            Ok(ok())
        },
        (&Method::DELETE, Route::Service(raw)) => {
            let path = required_path(raw, ApiError::BadRequest(PATH_REQUIRED))?;
            store.delete(&path)?;
            Ok(ok())
        },
        _ => Err(ApiError::NoRoute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_routes() {
        assert_eq!(classify("/time"), Some(Route::TimeAll));
        assert_eq!(classify("/time/"), Some(Route::Time("")));
        assert_eq!(classify("/time/a/b"), Some(Route::Time("a/b")));
        assert_eq!(classify("/tree/a"), Some(Route::Tree("a")));
        assert_eq!(classify("/service/a%20b"), Some(Route::Service("a%20b")));
        assert_eq!(classify("/service"), None);
        assert_eq!(classify("/tree"), None);
        assert_eq!(classify("/timex"), None);
        assert_eq!(classify("/health"), None);
        assert_eq!(classify(""), None);
    }
}
