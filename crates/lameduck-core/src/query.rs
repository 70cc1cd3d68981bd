//! Closing-state queries for request handlers.
//!
//! Long-running handlers (long polling, streaming) can poll these to find out
//! that shutdown began and return early.
//!
//! # Example
//!
//! ```rust,ignore
//! use lameduck_core::{check, ResponseHandle};
//!
//! async fn long_poll(response: ResponseHandle) -> Result<&'static str, ShutdownError> {
//!     for _ in 0..15 {
//!         if check(&response)? {
//!             break;
//!         }
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!     }
//!     Ok("ok")
//! }
//! ```

use crate::error::{ShutdownError, ShutdownResult};
use crate::handle::Handle;

/// Returns `true` if the server owning `handle` is shutting down.
///
/// # Errors
///
/// Returns [`ShutdownError::UnsupportedHandle`] if the handle is not owned
/// by a live server.
pub fn is_closing<'a>(handle: impl Into<Handle<'a>>) -> ShutdownResult<bool> {
    let handle = handle.into();
    let server = handle
        .socket()
        .server()
        .ok_or(ShutdownError::UnsupportedHandle { kind: handle.kind() })?;
    Ok(server.is_closing())
}

/// Like [`is_closing`], but when the server is closing and `handle` is a
/// response, also advertises `Connection: close` on it.
///
/// The advertisement happens at most once per socket, however often this is
/// called, and only while the response head has not been sent.
///
/// # Errors
///
/// Returns [`ShutdownError::UnsupportedHandle`] if the handle is not owned
/// by a live server.
pub fn check<'a>(handle: impl Into<Handle<'a>>) -> ShutdownResult<bool> {
    let handle = handle.into();
    let server = handle
        .socket()
        .server()
        .ok_or(ShutdownError::UnsupportedHandle { kind: handle.kind() })?;

    if !server.is_closing() {
        return Ok(false);
    }
    if let Handle::Response(response) = handle {
        server.tag_if_closing(response);
    }
    Ok(true)
}
