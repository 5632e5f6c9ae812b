//! zabbix-webhook - alert webhook to Zabbix trapper bridge

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zabbix_webhook::{app::App, cli::Cli, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Layer defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            // The configured level is unknown at this point.
            tracing_subscriber::fmt().with_env_filter("error").init();
            error!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("zabbix-webhook starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Config File: {}", cli.config.display());
    info!("Listen Address: {}", config.listen_addr());
    info!("Queue Capacity: {}", config.queue_capacity);
    info!(
        "Zabbix Server: {}:{}",
        config.zabbix_server_host, config.zabbix_server_port
    );
    info!("Zabbix Host Annotation: {:?}", config.zabbix_host_annotation);
    info!("Zabbix Host Default: {:?}", config.zabbix_host_default);
    info!("Zabbix Key Prefix: {}", config.zabbix_key_prefix);
    info!("Idle Interval: {}ms", config.idle_interval_ms);
    info!("Send Timeout: {}s", config.send_timeout_seconds);
    match config.max_batch_size {
        Some(max) => info!("Max Batch Size: {}", max),
        None => info!("Max Batch Size: unlimited"),
    }
    info!("Delivery Retries: {}", config.delivery_retries);
    info!(
        "Metrics Endpoint: {}",
        if config.metrics.enabled {
            config.metrics.listen_address.to_string()
        } else {
            "Disabled".to_string()
        }
    );
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received. Shutting down gracefully..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    app.run().await
}
