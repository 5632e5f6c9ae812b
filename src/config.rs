//! Configuration management for the webhook bridge
//!
//! This module defines the `Config` struct holding every runtime setting.
//! Settings are layered with `figment`: built-in defaults, then the config
//! file (YAML, or TOML when the file ends in `.toml`), then
//! `ZABBIX_WEBHOOK_*` environment variables, then command-line flags.
//!
//! The file keys keep their historical camelCase spelling
//! (`queueCapacity`, `zabbixServerHost`, ...).

use crate::cli::Cli;
use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Prefix of the environment variables that override file settings, e.g.
/// `ZABBIX_WEBHOOK_QUEUE_CAPACITY=100` or `ZABBIX_WEBHOOK_METRICS__ENABLED=true`.
pub const ENV_PREFIX: &str = "ZABBIX_WEBHOOK_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't open the config file '{}': file does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("can't read the config file: {0}")]
    Extract(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Port the alert receiver listens on.
    pub port: u16,
    /// Address the alert receiver binds to.
    pub listen_address: IpAddr,
    /// Maximum number of alerts waiting for dispatch.
    pub queue_capacity: usize,
    pub zabbix_server_host: String,
    pub zabbix_server_port: u16,
    /// Host used when the host annotation is empty.
    pub zabbix_host_default: String,
    /// Host every sample is reported under. An empty value disables it.
    pub zabbix_host_annotation: String,
    /// Item keys are built as `<prefix>.<severity>`.
    pub zabbix_key_prefix: String,
    pub log_level: String,
    /// How long the dispatcher waits for a record before re-checking.
    pub idle_interval_ms: u64,
    /// Upper bound for a single delivery to the backend.
    pub send_timeout_seconds: u64,
    /// Flush as soon as a batch reaches this many samples. Unset means a batch
    /// grows until the queue momentarily empties.
    pub max_batch_size: Option<usize>,
    /// Extra delivery attempts for a failed batch. Zero keeps the
    /// at-most-once behaviour: a failed batch is logged and discarded.
    pub delivery_retries: u32,
    pub retry_backoff_ms: u64,
    pub metrics: MetricsConfig,
}

/// Configuration for the Prometheus scrape endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            queue_capacity: 500,
            zabbix_server_host: "127.0.0.1".to_string(),
            zabbix_server_port: 10051,
            zabbix_host_default: String::new(),
            zabbix_host_annotation: "zabbix_host".to_string(),
            zabbix_key_prefix: "prometheus".to_string(),
            log_level: "info".to_string(),
            idle_interval_ms: 1000,
            send_timeout_seconds: 10,
            max_batch_size: None,
            delivery_retries: 0,
            retry_backoff_ms: 500,
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration named by the command line.
    ///
    /// A missing file is an error: the bridge refuses to start without one.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let figment = Self::figment_for_file(&cli.config)?
            .merge(
                // `map` resets the lowercasing flag, so it must be turned off
                // afterwards to keep the camelCase paths intact.
                Env::prefixed(ENV_PREFIX)
                    .map(|key| env_key_to_path(&key.as_str().to_ascii_lowercase()).into())
                    .lowercase(false),
            )
            .merge(cli.clone());
        Self::from_figment(figment)
    }

    /// Loads the configuration from a file only, without environment or
    /// command-line overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment_for_file(path.as_ref())?)
    }

    fn figment_for_file(path: &Path) -> Result<Figment, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        Ok(if is_toml {
            figment.merge(Toml::file(path))
        } else {
            figment.merge(Yaml::file(path))
        })
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queueCapacity must be greater than 0".into()));
        }
        if self.max_batch_size == Some(0) {
            return Err(ConfigError::Invalid("maxBatchSize must be greater than 0".into()));
        }
        if self.idle_interval_ms == 0 {
            return Err(ConfigError::Invalid("idleIntervalMs must be greater than 0".into()));
        }
        if self.send_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "sendTimeoutSeconds must be greater than 0".into(),
            ));
        }
        if self.zabbix_server_host.is_empty() {
            return Err(ConfigError::Invalid("zabbixServerHost must not be empty".into()));
        }
        Ok(())
    }

    /// The socket address the alert receiver binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Maps a prefix-stripped, lowercased environment key onto a config path:
/// `queue_capacity` becomes `queueCapacity` and `metrics__listen_address`
/// becomes `metrics.listenAddress`.
fn env_key_to_path(key: &str) -> String {
    key.split("__")
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            let mut upper = false;
            for c in segment.chars() {
                if c == '_' {
                    upper = true;
                } else if upper {
                    out.extend(c.to_uppercase());
                    upper = false;
                } else {
                    out.push(c);
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}
