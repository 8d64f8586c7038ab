//! Helpers shared by the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use serde_json::Value;
use svctime_core::store::{ForestStore, SqliteTreeStore};
use svctime_core::{ApiVersion, Credentials, TreeStore};
use svctime_daemon::{AppState, router};
use tower::ServiceExt;

pub const GOOD: &str = "user:passwd";
pub const BAD: &str = "user:nope";

pub fn app_with(store: Arc<dyn TreeStore>, version: ApiVersion) -> Router {
    router(AppState::new(
        store,
        Credentials::new("user", "passwd"),
        version,
    ))
}

pub fn forest_app(version: ApiVersion) -> Router {
    app_with(Arc::new(ForestStore::in_memory()), version)
}

pub fn sqlite_app(version: ApiVersion) -> Router {
    let store = SqliteTreeStore::in_memory().expect("failed to open in-memory db");
    app_with(Arc::new(store), version)
}

pub fn basic(pair: &str) -> String {
    format!("Basic {}", STANDARD.encode(pair))
}

/// Sends one request and returns the status and JSON body (`Null` when the
/// body is empty or not JSON).
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(pair) = auth {
        builder = builder.header(AUTHORIZATION, basic(pair));
    }
    let request = match body {
        Some(json) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_owned())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Some(GOOD), None).await
}

pub async fn post(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(GOOD), None).await
}

pub async fn put(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    send(app, Method::PUT, uri, Some(GOOD), Some(body)).await
}

pub async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::DELETE, uri, Some(GOOD), None).await
}
