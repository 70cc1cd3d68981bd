//! Layered configuration loading.
//!
//! Layers, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML or JSON file (format chosen by extension)
//! 3. A `.env` file, loaded into the process environment
//! 4. Environment variables of the form `PREFIX__SECTION__KEY`
//!
//! # Example
//!
//! ```no_run
//! use lameduck_server::ConfigLoader;
//!
//! # fn main() -> Result<(), lameduck_server::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("lameduck.toml")?
//!     .with_dotenv()
//!     .with_env_prefix("LAMEDUCK")
//!     .load()?;
//!
//! let server = config.server_config();
//! # Ok(())
//! # }
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use lameduck_core::ShutdownOptions;
use serde::{Deserialize, Serialize};

use crate::config::{ServerConfig, DEFAULT_HTTP_ADDR, DEFAULT_KEEP_ALIVE_MS};
use crate::error::ConfigError;
use crate::telemetry::LogConfig;

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "LAMEDUCK";

/// Complete configuration of a lameduck server process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LameduckConfig {
    /// Listener settings.
    pub server: ServerSection,

    /// Idle and force sweep timing.
    pub shutdown: ShutdownOptions,

    /// Logging settings.
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address.
    pub http_addr: String,

    /// Keep-alive idle timeout in milliseconds; `0` disables it.
    pub keep_alive_timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            keep_alive_timeout_ms: DEFAULT_KEEP_ALIVE_MS,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Filter directive.
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LameduckConfig {
    /// Checks the configuration for values the server cannot run with.
    ///
    /// An idle timeout that is not shorter than the force timeout is
    /// accepted; the idle sweep is simply never armed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unparsable address, an
    /// empty log level or a zero shutdown timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("'{}' is not a socket address", self.server.http_addr),
            ));
        }

        if self.shutdown.idle_timeout().is_zero() {
            return Err(ConfigError::invalid_value(
                "shutdown.idle_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.shutdown.force_timeout().is_zero() {
            return Err(ConfigError::invalid_value(
                "shutdown.force_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.log.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("log.level", "must not be empty"));
        }

        if !self.shutdown.idle_sweep_armed() {
            tracing::warn!(
                idle_timeout = ?self.shutdown.idle_timeout(),
                force_timeout = ?self.shutdown.force_timeout(),
                "Idle timeout is not shorter than force timeout; idle sweep disabled"
            );
        }

        Ok(())
    }

    /// Builds the [`ServerConfig`] described by this configuration.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let keep_alive = match self.server.keep_alive_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        ServerConfig::builder()
            .http_addr(self.server.http_addr.clone())
            .keep_alive_timeout(keep_alive)
            .shutdown(self.shutdown)
            .build()
    }

    /// Builds the [`LogConfig`] described by this configuration.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let base = match self.log.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };

        LogConfig {
            level: self.log.level.clone(),
            ..base
        }
    }
}

/// Configuration loader with layered approach.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: LameduckConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader holding the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, has
    /// an unsupported extension, or does not parse (unknown keys included).
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        self.config = match extension.as_deref() {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat(
                    path.display().to_string(),
                ))
            }
        };

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(self)
    }

    /// Loads the file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`with_file`](Self::with_file), except for a missing file.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in the given format ("toml" or
    /// "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unknown or parsing fails.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::UnsupportedFormat(format.to_string())),
        };
        Ok(self)
    }

    /// Enables environment overrides of the form `PREFIX__SECTION__KEY`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads a `.env` file from the current directory, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
        }
        self
    }

    /// Applies environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is unknown or malformed, or if
    /// validation fails.
    pub fn load(mut self) -> Result<LameduckConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let marker = format!("{prefix}__");
            let mut vars: Vec<(String, String)> = env::vars()
                .filter(|(key, _)| key.starts_with(&marker))
                .collect();
            vars.sort();

            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let rest = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => {
                self.config.server.http_addr = value.to_string();
            }
            ["SERVER", "KEEP_ALIVE_TIMEOUT_MS"] => {
                self.config.server.keep_alive_timeout_ms = parse_millis(key, value)?;
            }
            ["SHUTDOWN", "IDLE_TIMEOUT_MS"] => {
                self.config.shutdown = ShutdownOptions::new(
                    Duration::from_millis(parse_millis(key, value)?),
                    self.config.shutdown.force_timeout(),
                );
            }
            ["SHUTDOWN", "FORCE_TIMEOUT_MS"] => {
                self.config.shutdown = ShutdownOptions::new(
                    self.config.shutdown.idle_timeout(),
                    Duration::from_millis(parse_millis(key, value)?),
                );
            }
            ["LOG", "LEVEL"] => {
                self.config.log.level = value.to_string();
            }
            ["LOG", "FORMAT"] => {
                self.config.log.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
        }

        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected milliseconds as an integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load().unwrap();

        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.server.keep_alive_timeout_ms, 5_000);
        assert_eq!(config.shutdown, ShutdownOptions::default());
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_toml() {
        let toml = r#"
            [server]
            http_addr = "127.0.0.1:3000"
            keep_alive_timeout_ms = 0

            [shutdown]
            idle_timeout_ms = 1000
            force_timeout_ms = 5000

            [log]
            level = "debug"
            format = "pretty"
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:3000");
        assert_eq!(config.shutdown.idle_timeout(), Duration::from_secs(1));
        assert_eq!(config.shutdown.force_timeout(), Duration::from_secs(5));
        assert_eq!(config.server_config().keep_alive_timeout(), None);

        let log = config.log_config();
        assert_eq!(log.level, "debug");
        assert!(!log.json_format);
    }

    #[test]
    fn test_loader_with_string_json_partial() {
        let json = r#"{"shutdown": {"force_timeout_ms": 2000}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.shutdown.idle_timeout(), Duration::from_millis(15_000));
        assert_eq!(config.shutdown.force_timeout(), Duration::from_millis(2_000));
        assert!(!config.shutdown.idle_sweep_armed());
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_loader_rejects_unknown_keys() {
        let toml = r#"
            [server]
            max_connections = 10
        "#;

        let err = ConfigLoader::new().with_string(toml, "toml").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        let err = ConfigLoader::new().with_string("", "yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(f) if f == "yaml"));
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let mut config = LameduckConfig::default();
        config.shutdown = ShutdownOptions::new(Duration::ZERO, Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "shutdown.idle_timeout_ms"
        ));

        config.shutdown = ShutdownOptions::new(Duration::from_secs(1), Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "shutdown.force_timeout_ms"
        ));
    }

    #[test]
    fn test_validate_bad_address() {
        let mut config = LameduckConfig::default();
        config.server.http_addr = "localhost".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "server.http_addr"
        ));
    }

    #[test]
    fn test_with_file_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[shutdown]\nidle_timeout_ms = 250").unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.shutdown.idle_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_with_file_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();

        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_with_file_not_found() {
        let err = ConfigLoader::new().with_file("/nonexistent/lameduck.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/lameduck.toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config, LameduckConfig::default());
    }

    #[test]
    fn test_apply_env_var_overrides() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__HTTP_ADDR", "127.0.0.1:9000", "TEST").unwrap();
        loader.apply_env_var("TEST__SHUTDOWN__IDLE_TIMEOUT_MS", "100", "TEST").unwrap();
        loader.apply_env_var("TEST__SHUTDOWN__FORCE_TIMEOUT_MS", "900", "TEST").unwrap();
        loader.apply_env_var("TEST__LOG__FORMAT", "Pretty", "TEST").unwrap();

        assert_eq!(loader.config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(
            loader.config.shutdown,
            ShutdownOptions::new(Duration::from_millis(100), Duration::from_millis(900))
        );
        assert_eq!(loader.config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_apply_env_var_rejects_unknown_key() {
        let mut loader = ConfigLoader::new();
        let err = loader.apply_env_var("TEST__SERVER__MAX_CONNECTIONS", "5", "TEST").unwrap_err();

        assert!(matches!(err, ConfigError::EnvParseError { var, .. } if var == "TEST__SERVER__MAX_CONNECTIONS"));
    }

    #[test]
    fn test_apply_env_var_invalid_millis() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__SHUTDOWN__FORCE_TIMEOUT_MS", "soon", "TEST");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_reads_prefixed_environment() {
        env::set_var("LDTESTLOAD__SHUTDOWN__IDLE_TIMEOUT_MS", "42");

        let config = ConfigLoader::new().with_env_prefix("ldtestload").load().unwrap();
        env::remove_var("LDTESTLOAD__SHUTDOWN__IDLE_TIMEOUT_MS");

        assert_eq!(config.shutdown.idle_timeout(), Duration::from_millis(42));
    }
}
