//! Flat service API (`/api/v1`).
//!
//! Every service is addressed by exactly one path segment, percent-decoded
//! once and used verbatim. Requests whose path has more segments fall
//! through to the generic not-found response without an auth check.

use axum::http::Method;
use axum::response::Response;
use svctime_core::path::decode_name;

use super::{Request, created, new_name, ok, time};
use crate::auth::authorize;
use crate::error::{ApiError, SERVICE_MISSING};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Health,
    Time(String),
    Create(String),
    Rename(String),
    Delete(String),
}

/// A single non-empty segment, optionally followed by one `/`.
fn single_segment(raw: &str) -> Option<String> {
    let raw = raw.strip_suffix('/').unwrap_or(raw);
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    Some(decode_name(raw))
}

fn classify(method: &Method, rest: &str) -> Option<Route> {
    if *method == Method::GET && rest == "/health" {
        return Some(Route::Health);
    }
    if let Some(raw) = rest.strip_prefix("/time/") {
        return (*method == Method::GET)
            .then(|| single_segment(raw))
            .flatten()
            .map(Route::Time);
    }
    let name = single_segment(rest.strip_prefix("/service/")?)?;
    match *method {
        Method::POST => Some(Route::Create(name)),
        Method::PUT => Some(Route::Rename(name)),
        Method::DELETE => Some(Route::Delete(name)),
        _ => None,
    }
}

pub fn dispatch(state: &AppState, req: &Request<'_>) -> Result<Response, ApiError> {
    let route = classify(req.method, req.rest).ok_or(ApiError::NoRoute)?;
    if route != Route::Health {
        authorize(req.headers, state.credentials())?;
    }

    let flat = state.flat();
    match route {
        Route::Health => Ok(ok()),
        Route::Time(name) => Ok(time(flat.time(&name)?)),
        Route::Create(name) => {
            flat.create(&name)?;
            Ok(created())
        },
        Route::Rename(name) => {
            let new_name = new_name(req.body)?;
            if !flat.exists(&name)? {
                return Err(ApiError::NotFound(SERVICE_MISSING));
            }
            flat.rename(&name, &new_name)?;
            Ok(ok())
        },
        Route::Delete(name) => {
            flat.delete(&name)?;
            Ok(ok())
        },
    }
}
