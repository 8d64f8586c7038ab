//! WebSocket tracking sessions.
//!
//! A client opens `/ws/track` and authenticates with its first text frame:
//!
//! ```text
//! Client                                    Server
//!   |                                          |
//!   |  -- "user:pass|app1/cat1" ------------>  |
//!   |                                          |
//!   |  <-- "ok" -------------------------------|
//!   |      OR                                  |
//!   |  <-- "unauthorized" + close -------------|
//!   |      OR                                  |
//!   |  <-- "non-existant service" + close -----|
//!   |                                          |
//!   |  -- "+" -------------------------------> |  increment the bound path
//!   |  -- anything else ---------------------> |  ignored, no reply
//! ```
//!
//! [`TrackSession`] holds the protocol state and decides what to do with each
//! frame. [`run`] only moves frames between the socket and the session.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use svctime_core::{ApiVersion, Credentials, ServicePath, TreeStore};
use tracing::{debug, error, warn};

use crate::state::AppState;

/// Reply to a malformed first frame or wrong credentials.
pub const REJECT_UNAUTHORIZED: &str = "unauthorized";

/// Reply when the credentials are valid but the path does not resolve.
pub const REJECT_UNKNOWN_SERVICE: &str = "non-existant service";

/// Reply once the session is bound to a path.
pub const ACCEPTED: &str = "ok";

/// The frame that increments the bound path.
pub const INCREMENT_SIGNAL: &str = "+";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Waiting for the credential frame.
    #[default]
    AwaitingAuth,

    /// Authenticated and bound to a service.
    Tracking(ServicePath),

    /// Rejected; the connection is being closed.
    Closed,
}

/// What the socket loop should do after a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send a text frame and keep going.
    Reply(&'static str),

    /// Send a text frame, then close the connection.
    ReplyAndClose(&'static str),

    /// Increment the path and its ancestors.
    Increment(ServicePath),

    /// Do nothing.
    Ignore,
}

/// Per-connection state machine for the tracking protocol.
pub struct TrackSession {
    state: SessionState,
    store: Arc<dyn TreeStore>,
    credentials: Credentials,
    api_version: ApiVersion,
}

impl TrackSession {
    #[must_use]
    pub fn new(app: &AppState) -> Self {
        Self {
            state: SessionState::AwaitingAuth,
            store: Arc::clone(app.store()),
            credentials: app.credentials().clone(),
            api_version: app.api_version(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Handles one text frame.
    pub fn handle_frame(&mut self, frame: &str) -> SessionAction {
        if self.state == SessionState::AwaitingAuth {
            return self.authenticate(frame);
        }
        match &self.state {
            SessionState::Tracking(path) if frame == INCREMENT_SIGNAL => {
                SessionAction::Increment(path.clone())
            },
            _ => SessionAction::Ignore,
        }
    }

    /// Handles a binary frame. Before authentication it counts as a
    /// malformed credential frame.
    pub fn handle_non_text(&mut self) -> SessionAction {
        match self.state {
            SessionState::AwaitingAuth => self.reject(REJECT_UNAUTHORIZED),
            SessionState::Tracking(_) | SessionState::Closed => SessionAction::Ignore,
        }
    }

    fn authenticate(&mut self, frame: &str) -> SessionAction {
        let Some((user, pass, service)) = split_auth_frame(frame) else {
            warn!("tracking session sent a malformed credential frame");
            return self.reject(REJECT_UNAUTHORIZED);
        };
        if !self.credentials.verify(user, pass) {
            warn!(user, "tracking session rejected: wrong credentials");
            return self.reject(REJECT_UNAUTHORIZED);
        }

        let path = match self.api_version {
            ApiVersion::V1 => ServicePath::root(service),
            ApiVersion::V2 => ServicePath::parse(service),
        };
        match self.store.exists(&path) {
            Ok(true) => {
                debug!(path = %path, "tracking session bound");
                self.state = SessionState::Tracking(path);
                SessionAction::Reply(ACCEPTED)
            },
            Ok(false) => {
                debug!(path = %path, "tracking session rejected: unknown service");
                self.reject(REJECT_UNKNOWN_SERVICE)
            },
            Err(e) => {
                error!(error = %e, "store fault during tracking session auth");
                self.reject(REJECT_UNAUTHORIZED)
            },
        }
    }

    fn reject(&mut self, reply: &'static str) -> SessionAction {
        self.state = SessionState::Closed;
        SessionAction::ReplyAndClose(reply)
    }
}

/// Splits `user:pass|path` on the first `|` and then the first `:`.
///
/// Returns `None` when the credential part or the path part is blank, or the
/// credential part has no `:`.
///
/// Everything after the separator is kept, so passwords may contain `:` and
/// V1 names may contain `|` (`u:p:x|a|b` is user `u`, password `p:x`,
/// service `a|b`). Later separators are never dropped.
fn split_auth_frame(frame: &str) -> Option<(&str, &str, &str)> {
    let (credentials, service) = frame.split_once('|')?;
    if credentials.is_empty() || service.is_empty() {
        return None;
    }
    let (user, pass) = credentials.split_once(':')?;
    Some((user, pass, service))
}

/// `GET /ws/track`: upgrades and runs a tracking session.
pub async fn track(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run(socket, TrackSession::new(&app)))
}

/// Drives one session until the peer closes or the session is rejected.
pub async fn run(mut socket: WebSocket, mut session: TrackSession) {
    while let Some(received) = socket.recv().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "tracking socket error");
                break;
            },
        };
        let action = match message {
            Message::Text(text) => session.handle_frame(text.as_str()),
            Message::Binary(_) => session.handle_non_text(),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        match action {
            SessionAction::Reply(reply) => {
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            },
            SessionAction::ReplyAndClose(reply) => {
                let _ = socket.send(Message::Text(reply.into())).await;
                let _ = socket.send(Message::Close(None)).await;
                break;
            },
            SessionAction::Increment(path) => match session.store.increment(&path) {
                Ok(()) => {},
                Err(e) if e.is_fault() => error!(path = %path, error = %e, "increment failed"),
                Err(e) => debug!(path = %path, error = %e, "increment skipped"),
            },
            SessionAction::Ignore => {},
        }
    }
    debug!(state = ?session.state(), "tracking session ended");
}
