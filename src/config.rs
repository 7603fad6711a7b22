//! Service configuration.
//!
//! One explicit [`Config`] object is built at startup and handed to every
//! component that needs it. Request handlers receive it through the shared
//! application state; nothing reads ambient globals or environment variables
//! at request time.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Default page size for listings when the caller does not pass `limit`.
pub const DEFAULT_LIMIT: usize = 50;

/// Hard upper bound for `limit` on listing and export endpoints.
pub const MAX_LIMIT: usize = 500;

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Socket address the HTTP server binds to.
    pub bind: SocketAddr,
    /// Whether `/admin/*` maintenance endpoints are registered.
    pub admin_enabled: bool,
}

impl Config {
    /// Build a config rooted at the given database path with defaults
    /// suitable for tests.
    #[must_use]
    pub fn for_db(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            admin_enabled: true,
        }
    }
}
