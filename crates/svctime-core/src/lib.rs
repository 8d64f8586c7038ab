//! Core library for svctime, a tracker of elapsed time counters for named
//! services.
//!
//! Services form a forest: every node has a name unique among its siblings
//! and a counter. Incrementing a node increments all of its ancestors, so a
//! node's counter is the time observed through it or any descendant.
//!
//! - [`path`]: the [`ServicePath`] segment model and its parsing rules.
//! - [`store`]: the [`TreeStore`] interface and its arena and `SQLite`
//!   backends.
//! - [`flat`]: the single-name namespace served by the first protocol
//!   generation.
//! - [`credentials`]: the static shared credential pair.
//! - [`config`]: TOML configuration and backend selection.
//!
//! This crate has no HTTP types. Protocol surfaces live in `svctime-daemon`.

pub mod config;
pub mod credentials;
pub mod flat;
pub mod path;
pub mod store;

pub use config::{ApiVersion, Backend, ConfigError, ServiceConfig};
pub use credentials::Credentials;
pub use flat::FlatView;
pub use path::ServicePath;
pub use store::{ServiceNode, StoreError, TreeStore};
