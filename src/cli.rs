//! Command-Line Interface (CLI) argument parsing.
//!
//! The arguments are parsed at startup and merged on top of the config file
//! and environment variables, so a flag always wins.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Receives alert webhooks over HTTP and forwards them to a Zabbix trapper.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (YAML, or TOML with a `.toml` extension).
    #[arg(short, long, value_name = "FILE", default_value = "config.yml")]
    pub config: PathBuf,

    /// Port to listen on for incoming alerts.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Log filter, e.g. `info` or `zabbix_webhook=debug`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(port) = self.port {
            dict.insert("port".into(), Value::from(port));
        }

        if let Some(level) = &self.log_level {
            dict.insert("logLevel".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
