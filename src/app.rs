//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::{MetricSink, SampleBuilder},
    dispatcher::{BatchDispatcher, DispatcherSettings},
    ingest::IngestionEndpoint,
    internal_metrics::{Metrics, MetricsBuilder},
    queue::AlertQueue,
    task_manager::TaskManager,
    zabbix::ZabbixSender,
};
use anyhow::{Context, Result};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// The stop signal every task of the app watches.
///
/// It is raised either by the external shutdown signal or by a task that
/// cannot keep going, in which case the reason is kept for `App::run`.
#[derive(Clone, Debug)]
struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl StopSignal {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let signal = Self {
            tx: Arc::new(tx),
            failure: Arc::new(Mutex::new(None)),
        };
        (signal, rx)
    }

    fn stop(&self) {
        self.tx.send_replace(true);
    }

    fn fail(&self, reason: String) {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get_or_insert(reason);
        self.stop();
    }

    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    stop: StopSignal,
    local_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    queue: AlertQueue,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The address the alert receiver is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// The queue between the receiver and the dispatcher.
    pub fn queue(&self) -> &AlertQueue {
        &self.queue
    }

    /// Waits for the shutdown signal, then lets every task wind down.
    ///
    /// The HTTP server stops accepting first and closes the queue on its way
    /// out; the dispatcher then drains what is left and exits. If the HTTP
    /// server dies on its own the same sequence runs and its error is
    /// returned.
    pub async fn run(self) -> Result<()> {
        let mut stop_rx = self.task_manager.get_shutdown_rx();
        // The sender lives in `self.stop`, so this only returns once raised.
        let _ = stop_rx.wait_for(|stop| *stop).await;
        info!("Shutdown signal received. Waiting for tasks to complete...");

        let panicked = self.task_manager.shutdown().await;
        if let Some(reason) = self.stop.failure() {
            anyhow::bail!("alert receiver failed: {}", reason);
        }
        if !panicked.is_empty() {
            anyhow::bail!("tasks panicked during shutdown: {:?}", panicked);
        }
        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Keeps construction separate from running, and lets tests swap the
/// backend transport and metrics for fakes.
pub struct AppBuilder {
    config: Config,
    sink_override: Option<Arc<dyn MetricSink>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sink_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the metric sink for testing.
    pub fn sink_override(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink_override = Some(sink);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and starts all components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;

        // Tasks watch the internal signal, which follows the external one.
        let (stop, stop_rx) = StopSignal::new();
        let task_manager = TaskManager::new(stop_rx);
        let relay = stop.clone();
        let mut relay_rx = task_manager.get_shutdown_rx();
        let mut shutdown_rx = shutdown_rx;
        task_manager.spawn("ShutdownRelay", async move {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => {}
                _ = relay_rx.wait_for(|stop| *stop) => {}
            }
            relay.stop();
        });

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server_info) = match self.metrics_override {
            Some(m) => (m, None),
            None => {
                MetricsBuilder::new(config.metrics.clone())
                    .build(task_manager.get_shutdown_rx())
                    .await
            }
        };
        let metrics = Arc::new(metrics);

        let metrics_addr = if let Some((server, addr)) = metrics_server_info {
            info!(%addr, "Metrics endpoint listening");
            task_manager.spawn("MetricsServer", server.run());
            Some(addr)
        } else {
            None
        };

        // =========================================================================
        // 2. Queue and Sink
        // =========================================================================
        let queue = AlertQueue::new(config.queue_capacity);
        let sink = match self.sink_override {
            Some(sink) => sink,
            None => {
                debug!(
                    host = %config.zabbix_server_host,
                    port = config.zabbix_server_port,
                    "Initializing Zabbix sender"
                );
                Arc::new(
                    ZabbixSender::new(config.zabbix_server_host.clone(), config.zabbix_server_port)
                        .with_timeout(config.send_timeout()),
                ) as Arc<dyn MetricSink>
            }
        };

        // =========================================================================
        // 3. Alert Receiver
        // =========================================================================
        // Bind before spawning anything that depends on the queue so a busy
        // port fails the build cleanly.
        let listener = TcpListener::bind(config.listen_addr())
            .await
            .with_context(|| format!("can't listen on {}", config.listen_addr()))?;
        let local_addr = listener.local_addr()?;

        // =========================================================================
        // 4. Batch Dispatcher
        // =========================================================================
        let dispatcher = BatchDispatcher::new(
            queue.clone(),
            sink,
            SampleBuilder::new(
                config.zabbix_host_annotation.clone(),
                config.zabbix_host_default.clone(),
                config.zabbix_key_prefix.clone(),
            ),
            DispatcherSettings::from(&config),
            metrics.clone(),
        );
        task_manager.spawn("BatchDispatcher", dispatcher.run());

        let router = IngestionEndpoint::new(queue.clone(), metrics.clone()).router();
        let server_queue = queue.clone();
        let mut server_shutdown_rx = task_manager.get_shutdown_rx();
        let server_stop = stop.clone();
        task_manager.spawn("HttpServer", async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await;
            if let Err(e) = result {
                error!("Alert receiver failed: {}", e);
                server_stop.fail(e.to_string());
            }
            // No handler can enqueue any more; let the dispatcher drain.
            server_queue.close();
            info!("Alert receiver stopped, queue closed.");
        });

        info!(%local_addr, "Webhook bridge initialized. Waiting for alerts...");

        Ok(App {
            task_manager,
            stop,
            local_addr,
            metrics_addr,
            queue,
        })
    }
}
