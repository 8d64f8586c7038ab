//! Server configuration.
//!
//! Configuration is read from an optional TOML file:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 3000
//! api_version = "v2"
//!
//! [auth]
//! username = "user"
//! password = "passwd"
//!
//! [storage]
//! backend = "sqlite"   # "sqlite" | "file" | "memory"
//! path = "svctime.db"
//! ```
//!
//! Every key has a default, so an empty file (or no file) is valid. The
//! daemon applies command-line and environment overrides on top.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::store::{ForestStore, SqliteTreeStore, StoreError, TreeStore};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty username, a zero port, or a
    /// persistent backend with an empty storage path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.username.is_empty() {
            return Err(ConfigError::Validation("auth.username must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must not be 0".into()));
        }
        if self.storage.backend != Backend::Memory && self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(format!(
                "storage.path is required for the {} backend",
                self.storage.backend
            )));
        }
        Ok(())
    }

    /// The configured credential pair.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.auth.username.clone(), self.auth.password.clone())
    }

    /// Opens the configured store backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the store cannot be opened.
    pub fn open_store(&self) -> Result<Arc<dyn TreeStore>, StoreError> {
        let store: Arc<dyn TreeStore> = match self.storage.backend {
            Backend::Sqlite => Arc::new(SqliteTreeStore::open(&self.storage.path)?),
            Backend::File => Arc::new(ForestStore::open(&self.storage.path)?),
            Backend::Memory => Arc::new(ForestStore::in_memory()),
        };
        Ok(store)
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Which protocol generation the process serves.
    #[serde(default)]
    pub api_version: ApiVersion,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            api_version: ApiVersion::default(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Shared credential pair.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn default_username() -> String {
    "user".to_string()
}

fn default_password() -> String {
    "passwd".to_string()
}

/// Store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Database or snapshot file. Ignored by the memory backend.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("svctime.db")
}

/// Protocol generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    /// Flat service names under `/api/v1`.
    V1,
    /// Hierarchical service paths under `/api/v2`.
    #[default]
    V2,
}

impl ApiVersion {
    /// URL prefix the generation is served under.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::V1 => "/api/v1",
            Self::V2 => "/api/v2",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        })
    }
}

impl FromStr for ApiVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(ConfigError::Validation(format!(
                "unknown api version {other:?} (expected v1 or v2)"
            ))),
        }
    }
}

/// Store backend kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `SQLite` database file.
    #[default]
    Sqlite,
    /// JSON snapshot file.
    File,
    /// Nothing persisted.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::File => "file",
            Self::Memory => "memory",
        })
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Validation(format!(
                "unknown storage backend {other:?} (expected sqlite, file or memory)"
            ))),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
