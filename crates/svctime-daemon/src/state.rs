//! Shared server state.
//!
//! One store instance serves every HTTP request and every live tracking
//! session; handlers receive clones of [`AppState`] that all point at it.

use std::sync::Arc;

use svctime_core::{ApiVersion, Credentials, FlatView, TreeStore};

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn TreeStore>,
    credentials: Arc<Credentials>,
    api_version: ApiVersion,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn TreeStore>,
        credentials: Credentials,
        api_version: ApiVersion,
    ) -> Self {
        Self {
            store,
            credentials: Arc::new(credentials),
            api_version,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    /// The store addressed by single names.
    #[must_use]
    pub fn flat(&self) -> FlatView {
        FlatView::new(Arc::clone(&self.store))
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The protocol generation this process serves.
    #[must_use]
    pub const fn api_version(&self) -> ApiVersion {
        self.api_version
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("credentials", &self.credentials)
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}
