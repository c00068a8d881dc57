use crate::error::ConfigError;
use serde::Deserialize;
use std::net::SocketAddr;

/// The root configuration structure for the entire application.
///
/// Every section falls back to its defaults, so an empty `config.toml` (or none
/// at all) yields a runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub database: Database,
    pub settlement: Settlement,
    pub retention: Retention,
    pub logging: Logging,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

/// Connection pool settings. When `url` is absent, `DATABASE_URL` is read from
/// the environment (after loading `.env`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Tuning for the settlement engine's optimistic writes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settlement {
    /// How many times a compare-and-swap is re-read and retried before the
    /// operation gives up with a conflict.
    pub max_cas_retries: u32,
}

/// Defaults for the line-item janitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retention {
    pub default_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// An `EnvFilter` directive, overridden by `RUST_LOG` when set.
    pub level: String,
    /// Directory for the daily-rolling log file. Console only when unset.
    pub directory: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

impl Default for Settlement {
    fn default() -> Self {
        Self { max_cas_retries: 8 }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self { default_days: 30 }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info,sqlx=warn".to_string(),
            directory: None,
        }
    }
}

impl Server {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("invalid server address: {e}")))
    }
}

impl Config {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError("server.port must be non-zero".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if self.settlement.max_cas_retries == 0 {
            return Err(ConfigError::ValidationError(
                "settlement.max_cas_retries must be at least 1".into(),
            ));
        }
        if self.retention.default_days == 0 {
            return Err(ConfigError::ValidationError(
                "retention.default_days must be at least 1".into(),
            ));
        }
        self.server.socket_addr()?;
        Ok(())
    }
}
