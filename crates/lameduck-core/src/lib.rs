//! # Lameduck Core
//!
//! Keep-alive aware graceful shutdown for HTTP servers.
//!
//! When a server is asked to stop, in-flight requests are allowed to finish,
//! every connection is told (via `Connection: close`) that it will not be
//! reused, and the total shutdown time is bounded by two sweeps:
//!
//! - **Idle sweep**: after `idle_timeout`, every socket without an in-flight
//!   request is ended gracefully.
//! - **Force sweep**: after `force_timeout`, every socket still open is
//!   aborted, in-flight or not.
//!
//! Sockets whose last in-flight request completes after shutdown began are
//! ended as soon as that response finishes, without waiting for a sweep.
//!
//! This crate contains only the controller. The socket and listener
//! plumbing is supplied by an implementation of [`ServerPrimitive`]; see the
//! `lameduck-server` crate for a hyper-based one.
//!
//! ## Lifecycle
//!
//! ```text
//! Running ──shutdown()──▶ Draining ──force timeout──▶ Forcing
//!                            │                          │
//!                            └──── all sockets gone ────┴──▶ Closed
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use lameduck_core::{Graceful, ShutdownOptions};
//!
//! let graceful = Graceful::new(primitive, ShutdownOptions::default());
//!
//! // Inside the accept loop
//! let conn = graceful.connection_accepted(socket_id);
//!
//! // Per request
//! let request = graceful.request_started(socket_id);
//!
//! // Somewhere else
//! graceful.shutdown().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/lameduck-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod advertise;
pub mod error;
pub mod graceful;
pub mod handle;
mod inflight;
mod ledger;
pub mod metrics;
pub mod options;
pub mod primitive;
pub mod query;

pub use error::{BoxError, ShutdownError, ShutdownResult};
pub use graceful::{ConnectionGuard, Graceful, Phase, RequestGuard};
pub use handle::{Handle, RequestHandle, ResponseHandle, ResponseId, SocketHandle, SocketId};
pub use options::{ShutdownOptions, ShutdownOptionsBuilder};
pub use primitive::{EndMode, ServerPrimitive, StopFuture};
pub use query::{check, is_closing};
