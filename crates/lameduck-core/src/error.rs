//! Shutdown error types.

use thiserror::Error;

/// Boxed error reported by a [`ServerPrimitive`](crate::ServerPrimitive).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the shutdown controller and the closing-state queries.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The handle cannot be mapped to a managed server.
    #[error("{kind} is not supported: expected a socket, request or response owned by a managed server")]
    UnsupportedHandle {
        /// Kind of handle that was passed.
        kind: &'static str,
    },

    /// `shutdown()` was called on a server that is already shutting down.
    #[error("shutdown has already been started for this server")]
    AlreadyStarted,

    /// The server primitive failed while it was stopping.
    #[error("server failed to stop: {0}")]
    Stop(#[source] BoxError),
}

/// Result type for shutdown operations.
pub type ShutdownResult<T = ()> = Result<T, ShutdownError>;
