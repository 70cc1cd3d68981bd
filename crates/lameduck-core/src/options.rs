//! Shutdown timing options.
//!
//! # Example
//!
//! ```rust
//! use lameduck_core::ShutdownOptions;
//! use std::time::Duration;
//!
//! let options = ShutdownOptions::builder()
//!     .idle_timeout(Duration::from_secs(1))
//!     .force_timeout(Duration::from_secs(30))
//!     .build();
//!
//! assert!(options.idle_sweep_armed());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay before idle sockets are ended, in milliseconds.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 15_000;

/// Default delay before every socket is ended, in milliseconds.
pub const DEFAULT_FORCE_TIMEOUT_MS: u64 = 60_000;

/// Timing of the idle and force sweeps.
///
/// The idle sweep is only armed when `idle_timeout < force_timeout`;
/// otherwise only the force sweep applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownOptions {
    /// Delay before sockets with no in-flight request are ended.
    #[serde(rename = "idle_timeout_ms", with = "millis")]
    idle_timeout: Duration,

    /// Delay before every remaining socket is aborted.
    #[serde(rename = "force_timeout_ms", with = "millis")]
    force_timeout: Duration,
}

impl ShutdownOptions {
    /// Creates options with explicit timeouts.
    #[must_use]
    pub fn new(idle_timeout: Duration, force_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            force_timeout,
        }
    }

    /// Creates a new options builder.
    #[must_use]
    pub fn builder() -> ShutdownOptionsBuilder {
        ShutdownOptionsBuilder::default()
    }

    /// Returns the idle sweep delay.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Returns the force sweep delay.
    #[must_use]
    pub fn force_timeout(&self) -> Duration {
        self.force_timeout
    }

    /// Returns `true` if the idle sweep will be scheduled.
    #[must_use]
    pub fn idle_sweep_armed(&self) -> bool {
        self.idle_timeout < self.force_timeout
    }
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ShutdownOptions`].
#[derive(Debug, Clone)]
pub struct ShutdownOptionsBuilder {
    idle_timeout: Duration,
    force_timeout: Duration,
}

impl ShutdownOptionsBuilder {
    /// Creates a builder with the default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self {
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
            force_timeout: Duration::from_millis(DEFAULT_FORCE_TIMEOUT_MS),
        }
    }

    /// Sets the idle sweep delay.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the force sweep delay.
    #[must_use]
    pub fn force_timeout(mut self, timeout: Duration) -> Self {
        self.force_timeout = timeout;
        self
    }

    /// Builds the [`ShutdownOptions`].
    #[must_use]
    pub fn build(self) -> ShutdownOptions {
        ShutdownOptions {
            idle_timeout: self.idle_timeout,
            force_timeout: self.force_timeout,
        }
    }
}

impl Default for ShutdownOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// (De)serializes a `Duration` as whole milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes `duration` as milliseconds.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserializes milliseconds into a `Duration`.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
