//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use lameduck_server::ServerConfig;
//! use lameduck_core::ShutdownOptions;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:3030")
//!     .shutdown(ShutdownOptions::new(Duration::from_secs(1), Duration::from_secs(30)))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:3030");
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use lameduck_core::ShutdownOptions;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default keep-alive timeout in milliseconds.
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 5_000;

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080")
    http_addr: String,

    /// How long an idle keep-alive connection may wait for its next request
    keep_alive_timeout: Option<Duration>,

    /// Idle and force sweep timing
    shutdown: ShutdownOptions,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the HTTP bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses and returns the HTTP address as a `SocketAddr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.http_addr.parse()
    }

    /// Returns the keep-alive timeout, if configured.
    #[must_use]
    pub fn keep_alive_timeout(&self) -> Option<Duration> {
        self.keep_alive_timeout
    }

    /// Returns the shutdown options.
    #[must_use]
    pub fn shutdown(&self) -> ShutdownOptions {
        self.shutdown
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    keep_alive_timeout: Option<Duration>,
    shutdown: ShutdownOptions,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            keep_alive_timeout: Some(Duration::from_millis(DEFAULT_KEEP_ALIVE_MS)),
            shutdown: ShutdownOptions::default(),
        }
    }

    /// Sets the HTTP bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the keep-alive timeout.
    ///
    /// Set to `None` to let idle connections wait indefinitely.
    #[must_use]
    pub fn keep_alive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.keep_alive_timeout = timeout;
        self
    }

    /// Sets the shutdown options.
    #[must_use]
    pub fn shutdown(mut self, options: ShutdownOptions) -> Self {
        self.shutdown = options;
        self
    }

    /// Builds the [`ServerConfig`] with the configured values.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            keep_alive_timeout: self.keep_alive_timeout,
            shutdown: self.shutdown,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
