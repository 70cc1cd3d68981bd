//! # lameduck-server
//!
//! HTTP/1.1 keep-alive server driven by the [`lameduck_core`] shutdown
//! controller.
//!
//! - [`HttpServer`] binds a listener and serves connections with Hyper
//! - Every connection and request is reported to a [`Graceful`] controller
//! - [`ConfigLoader`] layers defaults, files and environment variables
//! - [`telemetry::init_logging`] installs structured logging
//!
//! ## Example
//!
//! ```rust,ignore
//! use lameduck_server::{text, Handler, HttpServer, RequestExt, ServerConfig};
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
//!     server
//!         .serve(Handler::new(|_req| async { text(http::StatusCode::OK, "ok") }))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! [`Graceful`]: lameduck_core::Graceful

#![doc(html_root_url = "https://docs.rs/lameduck-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod body;
pub mod config;
mod connections;
pub mod error;
pub mod handler;
pub mod loader;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use body::TrackedBody;
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ConfigError, ServerError};
pub use handler::{text, BoxedResponse, Handler, RequestExt, ResponseBody};
pub use loader::{
    ConfigLoader, LameduckConfig, LogFormat, LogSection, ServerSection, DEFAULT_ENV_PREFIX,
};
pub use server::HttpServer;
pub use telemetry::{init_logging, LogConfig};
