//! # Lameduck
//!
//! **Keep-alive aware graceful shutdown for HTTP servers**
//!
//! Stopping an HTTP/1.1 server that uses keep-alive is harder than closing
//! the listener: idle sockets stay open until the client drops them, and
//! requests in flight must be allowed to finish. Lameduck:
//!
//! - Advertises `Connection: close` on every response produced while the
//!   server shuts down
//! - Ends each socket as soon as its last in-flight response completes
//! - Ends idle sockets after `idle_timeout` and aborts everything left after
//!   `force_timeout`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lameduck::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = HttpServer::bind(ServerConfig::default()).await?;
//!     let graceful = server.graceful();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         let _ = graceful.shutdown().await;
//!     });
//!
//!     server.serve(Handler::new(|_req| async { text(http::StatusCode::OK, "ok") })).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/lameduck/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export the controller
pub use lameduck_core as core;

// Re-export the hyper server
pub use lameduck_server as server;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use lameduck::prelude::*;
/// ```
pub mod prelude {
    pub use lameduck_core::{
        check, is_closing, EndMode, Graceful, Handle, Phase, RequestHandle, ResponseHandle,
        ServerPrimitive, ShutdownError, ShutdownOptions, ShutdownResult, SocketHandle, SocketId,
    };

    pub use lameduck_server::{
        init_logging, text, ConfigLoader, Handler, HttpServer, LameduckConfig, LogConfig,
        RequestExt, ServerConfig, ServerError,
    };
}
