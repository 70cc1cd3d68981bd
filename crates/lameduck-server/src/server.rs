//! HTTP server implementation.
//!
//! This module provides an HTTP/1.1 server built on Hyper and Tokio whose
//! connections are managed by a [`Graceful`] controller.
//!
//! # Architecture
//!
//! - TCP listener bound to the configured address
//! - One task per connection, registered with the controller and listening
//!   on a control channel for end requests
//! - Per request: `request_started`, handles in the request extensions,
//!   head committed when the handler returns, body tracked until written
//!
//! # Example
//!
//! ```rust,ignore
//! use lameduck_server::{Handler, HttpServer, ServerConfig, text};
//!
//! let server = HttpServer::bind(ServerConfig::default()).await?;
//! let graceful = server.graceful();
//!
//! tokio::spawn(server.serve(Handler::new(|_req| async { text(StatusCode::OK, "ok") })));
//!
//! // Later
//! graceful.shutdown().await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use lameduck_core::{EndMode, Graceful};
use tokio::net::{TcpListener, TcpStream};

use crate::body::TrackedBody;
use crate::config::ServerConfig;
use crate::connections::{Connections, ListenerGuard, Registration};
use crate::error::ServerError;
use crate::handler::Handler;

/// An HTTP/1.1 server with keep-alive aware graceful shutdown.
pub struct HttpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    connections: Arc<Connections>,
    graceful: Graceful,
    listener_guard: ListenerGuard,
}

impl HttpServer {
    /// Binds the listener described by `config`.
    ///
    /// The server starts accepting once [`serve`](Self::serve) runs.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is invalid or cannot be
    /// bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = config.socket_addr().map_err(|e| {
            ServerError::Bind(format!("Invalid address '{}': {}", config.http_addr(), e))
        })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        let connections = Connections::new();
        let graceful = Graceful::new(connections.clone(), config.shutdown());
        let listener_guard = connections.open_listener();

        Ok(Self {
            listener,
            local_addr,
            config,
            connections,
            graceful,
            listener_guard,
        })
    }

    /// Returns the address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the shutdown controller of this server.
    #[must_use]
    pub fn graceful(&self) -> Graceful {
        self.graceful.clone()
    }

    /// Accepts connections until the controller asks the server to stop.
    ///
    /// Returns once the listener is closed. Connections accepted before that
    /// keep being served; [`Graceful::shutdown`] resolves when they are gone.
    ///
    /// # Errors
    ///
    /// Currently infallible at runtime; accept errors are logged and the
    /// loop keeps going.
    pub async fn serve(self, handler: Handler) -> Result<(), ServerError> {
        let Self {
            listener,
            local_addr,
            config,
            connections,
            graceful,
            listener_guard,
        } = self;

        tracing::info!("Server listening on {}", local_addr);
        let config = Arc::new(config);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let registration = connections.register();
                            tokio::spawn(serve_connection(
                                stream,
                                remote_addr,
                                registration,
                                Arc::clone(&connections),
                                graceful.clone(),
                                handler.clone(),
                                Arc::clone(&config),
                            ));
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                () = connections.stop_signal().recv() => {
                    tracing::info!(
                        "Stopped accepting connections, {} still open",
                        connections.active()
                    );
                    break;
                }
            }
        }

        drop(listener);
        drop(listener_guard);
        Ok(())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.local_addr)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Serves one connection until it closes or the controller ends it.
async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    registration: Registration,
    connections: Arc<Connections>,
    graceful: Graceful,
    handler: Handler,
    config: Arc<ServerConfig>,
) {
    let Registration {
        socket,
        mut control,
        token,
    } = registration;
    let conn_guard = graceful.connection_accepted(socket);
    tracing::debug!(%socket, "Accepted connection from {}", remote_addr);

    let service_graceful = graceful.clone();
    let service = service_fn(move |mut req: Request<Incoming>| {
        let graceful = service_graceful.clone();
        let handler = handler.clone();
        async move {
            let guard = graceful.request_started(socket);
            req.extensions_mut().insert(guard.request().clone());
            req.extensions_mut().insert(guard.response().clone());
            req.extensions_mut().insert(guard.request().socket().clone());

            let mut response = handler.call(req).await;
            guard.response().commit_headers(response.headers_mut());
            Ok::<_, Infallible>(response.map(|body| TrackedBody::new(body, guard)))
        }
    });

    let mut builder = http1::Builder::new();
    builder.keep_alive(true);
    if let Some(timeout) = config.keep_alive_timeout() {
        builder.timer(TokioTimer::new()).header_read_timeout(timeout);
    }
    let mut conn = Box::pin(builder.serve_connection(TokioIo::new(stream), service));

    let mut draining = false;
    let mut control_open = true;
    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,

            mode = control.recv(), if control_open => match mode {
                Some(EndMode::Graceful) => {
                    if !draining {
                        draining = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
                Some(EndMode::Abort) => {
                    tracing::debug!(%socket, "Aborting connection from {}", remote_addr);
                    break Ok(());
                }
                None => control_open = false,
            },
        }
    };

    if let Err(e) = result {
        tracing::debug!(%socket, "Connection error from {}: {}", remote_addr, e);
    }

    // Drops any in-flight exchange before the socket leaves the ledger.
    drop(conn);
    connections.unregister(socket);
    drop(conn_guard);
    drop(token);
}
