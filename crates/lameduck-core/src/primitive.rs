//! The server operations the controller drives.
//!
//! A [`ServerPrimitive`] owns the listener and the sockets. The controller
//! tells it which sockets to end and when to stop accepting; the primitive
//! reports connection and request lifecycle events back through
//! [`Graceful`](crate::Graceful).

use std::future::Future;
use std::pin::Pin;

use crate::error::BoxError;
use crate::handle::SocketId;

/// Future returned by [`ServerPrimitive::stop_accepting`].
pub type StopFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;

/// How a socket should be ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMode {
    /// Finish the current exchange, if any, then close.
    Graceful,
    /// Close immediately; in-flight requests are torn down.
    Abort,
}

/// Operations the controller invokes on the underlying server.
pub trait ServerPrimitive: Send + Sync + 'static {
    /// Ends a socket. Must not block; unknown or closed sockets are ignored.
    fn end_socket(&self, socket: SocketId, mode: EndMode);

    /// Stops accepting new connections.
    ///
    /// The returned future resolves once the listener is closed and every
    /// socket the server manages is gone.
    fn stop_accepting(&self) -> StopFuture;
}
