//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use svctime_core::StoreError;
use thiserror::Error;
use tracing::error;

/// Request-scoped failures and the responses they map to.
///
/// The message carried by the client-facing variants is sent verbatim as the
/// `error` field of the body.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required field or path is missing or invalid.
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    /// Credentials are missing or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// The addressed service does not resolve.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The target path is already taken.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// No route matches the method and path.
    #[error("no such route")]
    NoRoute,

    /// Backend fault. Never described to the client.
    #[error("internal error: {0}")]
    Internal(#[source] StoreError),
}

pub const SERVICE_MISSING: &str = "service does not exist";
pub const PARENT_MISSING: &str = "parent service does not exist";
pub const SERVICE_EXISTS: &str = "service already exists";
pub const PATH_REQUIRED: &str = "service path required";
pub const NEW_NAME_REQUIRED: &str = "new_name is required";
pub const NEW_NAME_SEGMENT: &str = "new_name must be a single path segment";

impl ApiError {
    /// - `BadRequest`: 400
    /// - `Unauthorized`: 401
    /// - `NotFound`, `NoRoute`: 404
    /// - `Conflict`: 409
    /// - `Internal`: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) | Self::NoRoute => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn status_text(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) | Self::NoRoute => "not found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal server error",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyPath => Self::BadRequest(PATH_REQUIRED),
            StoreError::EmptyName => Self::BadRequest(NEW_NAME_REQUIRED),
            StoreError::NotFound { .. } => Self::NotFound(SERVICE_MISSING),
            StoreError::ParentMissing { .. } => Self::NotFound(PARENT_MISSING),
            StoreError::AlreadyExists { .. } => Self::Conflict(SERVICE_EXISTS),
            fault => Self::Internal(fault),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::BadRequest(msg) | Self::NotFound(msg) | Self::Conflict(msg) => {
                json!({ "status": self.status_text(), "error": msg })
            },
            Self::Unauthorized | Self::NoRoute => json!({ "status": self.status_text() }),
            Self::Internal(fault) => {
                error!(error = %fault, "store fault while handling request");
                json!({ "status": self.status_text() })
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use svctime_core::ServicePath;

    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::BadRequest(PATH_REQUIRED).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound(SERVICE_MISSING).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::NoRoute.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Conflict(SERVICE_EXISTS).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn store_errors_map_to_categories() {
        let path = ServicePath::parse("a/b");
        assert!(matches!(
            ApiError::from(StoreError::ParentMissing { path: path.clone() }),
            ApiError::NotFound(PARENT_MISSING)
        ));
        assert!(matches!(
            ApiError::from(StoreError::AlreadyExists { path: path.clone() }),
            ApiError::Conflict(SERVICE_EXISTS)
        ));
        assert!(matches!(
            ApiError::from(StoreError::NotFound { path }),
            ApiError::NotFound(SERVICE_MISSING)
        ));
        assert!(matches!(
            ApiError::from(StoreError::Corrupt("bad".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn internal_status_is_500() {
        let err = ApiError::from(StoreError::Corrupt("disk".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
