//! HTTP Basic authentication.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use svctime_core::Credentials;
use tracing::warn;

use crate::error::ApiError;

/// Decodes an `Authorization: Basic <base64>` value into `(user, password)`.
///
/// The payload is split on the first `:`. A payload without any `:` is split
/// on the first space instead, which older clients send.
#[must_use]
pub fn decode_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    let payload = String::from_utf8(bytes).ok()?;
    let (user, pass) = payload
        .split_once(':')
        .or_else(|| payload.split_once(' '))?;
    Some((user.to_owned(), pass.to_owned()))
}

/// Verifies the request's Basic credentials.
pub fn authorize(headers: &HeaderMap, credentials: &Credentials) -> Result<(), ApiError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic);
    match presented {
        Some((user, pass)) if credentials.verify(&user, &pass) => Ok(()),
        Some((user, _)) => {
            warn!(user = %user, "rejected request with wrong credentials");
            Err(ApiError::Unauthorized)
        },
        None => {
            warn!("rejected request without usable Basic credentials");
            Err(ApiError::Unauthorized)
        },
    }
}
