//! The batch dispatcher drains the alert queue and delivers metric samples
//! to the backend.
//!
//! It is a single long-running task that owns the batch being built, so the
//! batch never needs locking. Records are pulled off the queue for as long as
//! they are immediately available; the moment the queue runs dry the batch
//! is flushed. With nothing queued and nothing pending the task parks on the
//! queue until a record arrives or the idle interval elapses.

use crate::config::Config;
use crate::core::{AlertRecord, Batch, MetricSample, MetricSink, SampleBuilder};
use crate::internal_metrics::Metrics;
use crate::queue::{AlertQueue, TryDequeue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

/// Tuning knobs for the dispatcher loop.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSettings {
    pub idle_interval: Duration,
    pub send_timeout: Duration,
    pub max_batch_size: Option<usize>,
    pub delivery_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DispatcherSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_interval: config.idle_interval(),
            send_timeout: config.send_timeout(),
            max_batch_size: config.max_batch_size,
            delivery_retries: config.delivery_retries,
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// How a flush ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered,
    Discarded,
}

pub struct BatchDispatcher {
    queue: AlertQueue,
    sink: Arc<dyn MetricSink>,
    samples: SampleBuilder,
    settings: DispatcherSettings,
    metrics: Arc<Metrics>,
}

impl BatchDispatcher {
    pub fn new(
        queue: AlertQueue,
        sink: Arc<dyn MetricSink>,
        samples: SampleBuilder,
        settings: DispatcherSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            sink,
            samples,
            settings,
            metrics,
        }
    }

    /// Runs until the queue is closed and drained. Whatever is still pending
    /// at that point is flushed once before returning.
    pub async fn run(self) {
        info!(sink = self.sink.name(), "Alert dispatcher started");
        let mut pending: Vec<MetricSample> = Vec::new();

        loop {
            match self.queue.try_dequeue() {
                TryDequeue::Record(record) => {
                    self.metrics.set_queue_depth(self.queue.len());
                    self.accumulate(&record, &mut pending);
                    if self.batch_is_full(&pending) {
                        debug!(count = pending.len(), "Batch size limit reached");
                        self.flush(&mut pending).await;
                    }
                    continue;
                }
                TryDequeue::Closed => break,
                TryDequeue::Empty => {}
            }

            self.metrics.set_queue_depth(0);
            if !pending.is_empty() {
                self.flush(&mut pending).await;
                continue;
            }

            // Nothing queued and nothing pending: park until a record shows
            // up or the idle interval passes.
            tokio::select! {
                record = self.queue.dequeue() => match record {
                    Some(record) => self.accumulate(&record, &mut pending),
                    None => break,
                },
                _ = tokio::time::sleep(self.settings.idle_interval) => {
                    trace!("Dispatcher idle");
                }
            }
        }

        if !pending.is_empty() {
            debug!(count = pending.len(), "Flushing final batch");
            self.flush(&mut pending).await;
        }
        info!("Alert queue closed, dispatcher stopped");
    }

    fn batch_is_full(&self, pending: &[MetricSample]) -> bool {
        self.settings
            .max_batch_size
            .is_some_and(|max| pending.len() >= max)
    }

    fn accumulate(&self, record: &AlertRecord, pending: &mut Vec<MetricSample>) {
        match self.samples.build(record) {
            Some(sample) => {
                info!(
                    host = %sample.host,
                    key = %sample.key,
                    value = %sample.value,
                    "Added metric sample"
                );
                pending.push(sample);
            }
            None => {
                debug!(alert_name = %record.alert_name, "No target host resolved, dropping alert");
                self.metrics.alerts_dropped_total.increment(1);
            }
        }
    }

    /// Delivers the pending samples and clears them whatever the outcome.
    #[instrument(skip_all, fields(count = pending.len()))]
    async fn flush(&self, pending: &mut Vec<MetricSample>) -> FlushOutcome {
        let Some(batch) = Batch::new(std::mem::take(pending)) else {
            return FlushOutcome::Discarded;
        };
        let count = batch.len();
        self.metrics.batch_size.record(count as f64);

        let start = Instant::now();
        let outcome = self.deliver(&batch).await;
        self.metrics
            .flush_duration_seconds
            .record(start.elapsed().as_secs_f64());

        match outcome {
            FlushOutcome::Delivered => {
                self.metrics.batches_sent_total.increment(1);
                self.metrics.samples_sent_total.increment(count as u64);
            }
            FlushOutcome::Discarded => {
                self.metrics.batches_failed_total.increment(1);
            }
        }
        outcome
    }

    async fn deliver(&self, batch: &Batch) -> FlushOutcome {
        let attempts = self.settings.delivery_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let result =
                tokio::time::timeout(self.settings.send_timeout, self.sink.send(batch)).await;
            let error = match result {
                Ok(Ok(response)) => {
                    info!(
                        sink = self.sink.name(),
                        count = batch.len(),
                        processed = response.processed,
                        failed = response.failed,
                        "Successfully sent batch"
                    );
                    return FlushOutcome::Delivered;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("send timed out after {:?}", self.settings.send_timeout),
            };

            if attempt < attempts {
                warn!(
                    sink = self.sink.name(),
                    attempt,
                    error = %error,
                    "Failed to send batch, retrying"
                );
                tokio::time::sleep(self.settings.retry_backoff).await;
            } else {
                error!(
                    sink = self.sink.name(),
                    count = batch.len(),
                    error = %error,
                    "Failed to send batch, discarding it"
                );
            }
        }
        FlushOutcome::Discarded
    }
}
