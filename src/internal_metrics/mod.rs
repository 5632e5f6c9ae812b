//! # Internal Metrics Module
//!
//! Counters, gauges and histograms describing the health of the pipeline,
//! plus an optional Prometheus scrape endpoint.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder and binds the
//!   scrape endpoint when metrics are enabled.
//! - **`Metrics`**: a cloneable handle passed into every component. It is
//!   the only way components report outcomes besides tracing events.
//! - **`MetricsServer`**: (Defined in `server.rs`) serves `/metrics`.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Gauge, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub alerts_received_total: Counter,
    pub alerts_dropped_total: Counter,
    pub samples_sent_total: Counter,
    pub batches_sent_total: Counter,
    pub batches_failed_total: Counter,
    pub alert_queue_depth: Gauge,
    pub batch_size: Histogram,
    pub flush_duration_seconds: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder. Without an installed
    /// recorder every handle is a no-op.
    pub fn new() -> Self {
        metrics::describe_counter!("alerts_received_total", Unit::Count, "Alerts accepted by the HTTP receiver and queued for dispatch.");
        metrics::describe_counter!("alerts_rejected_total", Unit::Count, "Requests rejected by the HTTP receiver, labeled by reason.");
        metrics::describe_counter!("alerts_dropped_total", Unit::Count, "Alerts discarded because no target host could be resolved.");
        metrics::describe_counter!("samples_sent_total", Unit::Count, "Metric samples delivered to the backend.");
        metrics::describe_counter!("batches_sent_total", Unit::Count, "Batches acknowledged by the backend.");
        metrics::describe_counter!("batches_failed_total", Unit::Count, "Batches discarded after a delivery failure.");
        metrics::describe_gauge!("alert_queue_depth", Unit::Count, "Alerts currently waiting in the queue.");
        metrics::describe_histogram!("batch_size", Unit::Count, "Number of samples per flushed batch.");
        metrics::describe_histogram!("flush_duration_seconds", Unit::Seconds, "Time spent delivering one batch, retries included.");

        Self {
            alerts_received_total: metrics::counter!("alerts_received_total"),
            alerts_dropped_total: metrics::counter!("alerts_dropped_total"),
            samples_sent_total: metrics::counter!("samples_sent_total"),
            batches_sent_total: metrics::counter!("batches_sent_total"),
            batches_failed_total: metrics::counter!("batches_failed_total"),
            alert_queue_depth: metrics::gauge!("alert_queue_depth"),
            batch_size: metrics::histogram!("batch_size"),
            flush_duration_seconds: metrics::histogram!("flush_duration_seconds"),
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    pub fn disabled() -> Self {
        Self {
            alerts_received_total: Counter::noop(),
            alerts_dropped_total: Counter::noop(),
            samples_sent_total: Counter::noop(),
            batches_sent_total: Counter::noop(),
            batches_failed_total: Counter::noop(),
            alert_queue_depth: Gauge::noop(),
            batch_size: Histogram::noop(),
            flush_duration_seconds: Histogram::noop(),
        }
    }

    /// Increments the rejection counter for a specific reason.
    pub fn increment_rejected(&self, reason: &'static str) {
        metrics::counter!("alerts_rejected_total", "reason" => reason).increment(1);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.alert_queue_depth.set(depth as f64);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer` with the address it is bound to.
    ///
    /// If metrics are disabled, or the recorder cannot be set up, this
    /// returns a disabled `Metrics` instance and `None` for the server.
    pub async fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus recorder: {}", e);
                return (Metrics::disabled(), None);
            }
        };
        let handle = recorder.handle();

        let listener = match TcpListener::bind(self.config.listen_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::disabled(), None);
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::disabled(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (metrics, Some((server, addr)))
    }
}
