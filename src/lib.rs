// ABOUTME: Async TCP server core, admission-controlled acceptor, per-connection session state
// ABOUTME: machine, and pluggable message framing, built on tokio

pub mod config;
pub mod error;
pub mod framing;
pub mod handler;
pub mod pool;
pub mod server;
pub mod session;

pub use config::{Protocol, ServerConfig};
pub use error::{ConfigError, FramingError, PoolError, ServerError, SessionError};
pub use framing::{DelimiterFramer, DelimiterFramerFactory, Framer, FramerFactory, LengthPrefixFramer, LengthPrefixFramerFactory};
pub use handler::Handler;
pub use pool::{IOOp, IOOpPool};
pub use server::Server;
pub use session::Session;
