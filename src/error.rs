// ABOUTME: Crate-level error taxonomy covering configuration, server, session, framing, and pool failures
// ABOUTME: Each enum derives thiserror::Error and composes via #[from] at the boundaries that wrap lower layers

use thiserror::Error;

/// Raised from [`crate::config::ServerConfig::validate`] when a field violates a documented
/// invariant. Framer-specific parameters (delimiter, header width, size bounds) are validated by
/// each Framer's own constructor and surfaced as [`FramingError`] instead, since `ServerConfig`
/// carries no framer-specific fields of its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bind address must not be empty")]
    EmptyBindAddress,

    #[error("max_connections must be at least 1")]
    ZeroMaxConnections,

    #[error("buffer_size must be greater than 0")]
    ZeroBufferSize,
}

/// Raised from [`crate::server::Server::run`] and [`crate::server::Server::new`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server run was cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Raised from [`crate::session::Session::send`] and surfaced to the receive loop on I/O failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not running")]
    NotRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O operation pool has been disposed")]
    PoolDisposed,
}

impl From<PoolError> for SessionError {
    fn from(_: PoolError) -> Self {
        SessionError::PoolDisposed
    }
}

/// Raised from [`crate::framing::Framer::feed`] when the configured bound is exceeded.
/// The framer is considered poisoned afterward; the session must disconnect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("unframed buffer exceeded the configured bound")]
    Overflow,

    #[error("invalid framer parameters: {0}")]
    InvalidParameters(String),
}

/// Raised from [`crate::pool::IOOpPool::get`]/[`crate::pool::IOOpPool::put`] after disposal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("I/O operation pool has been disposed")]
    Disposed,
}
