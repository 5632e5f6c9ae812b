//! Core domain types and service traits for the webhook bridge
//!
//! This module defines the data flowing through the pipeline (inbound alert
//! records, the metric samples derived from them, and batches of samples)
//! together with the `MetricSink` contract implemented by the backend
//! transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single alert notification as posted by the alerting frontend.
///
/// Every field is optional on the wire; a missing field decodes to an empty
/// string. Only `severity` and `alert_name` are used downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AlertRecord {
    pub alert_type: String,
    pub alert_name: String,
    pub search_period: String,
    /// The misspelled wire name is what producers actually send.
    #[serde(rename = "hit_oeprator")]
    pub hit_operator: String,
    #[serde(rename = "sev")]
    pub severity: String,
    pub messages: String,
}

/// A `(host, key, value[, clock])` tuple understood by the trapper backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricSample {
    pub host: String,
    pub key: String,
    pub value: String,
    /// Unix timestamp in seconds. When absent the backend stamps the value
    /// with its own receive time.
    #[serde(rename = "clock", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl MetricSample {
    pub fn new(host: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    /// Attaches an explicit clock value to the sample.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Turns alert records into metric samples.
///
/// The target host is the configured host annotation when it is non-empty,
/// falling back to the configured default host. When neither resolves the
/// record is not eligible for sending and no sample is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuilder {
    host_annotation: String,
    host_default: String,
    key_prefix: String,
}

impl SampleBuilder {
    pub fn new(
        host_annotation: impl Into<String>,
        host_default: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            host_annotation: host_annotation.into(),
            host_default: host_default.into(),
            key_prefix: key_prefix.into(),
        }
    }

    /// Resolves the host a record should be reported under, if any.
    pub fn resolve_host(&self) -> Option<&str> {
        [self.host_annotation.as_str(), self.host_default.as_str()]
            .into_iter()
            .find(|host| !host.is_empty())
    }

    /// Builds the sample for `record`, or `None` when no host resolves.
    pub fn build(&self, record: &AlertRecord) -> Option<MetricSample> {
        let host = self.resolve_host()?;
        let key = format!("{}.{}", self.key_prefix, record.severity);
        Some(MetricSample::new(host, key, record.alert_name.clone()))
    }
}

/// An ordered, non-empty group of samples delivered to the backend in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    samples: Vec<MetricSample>,
}

impl Batch {
    /// Wraps `samples` into a batch. Returns `None` for an empty vector so an
    /// empty batch can never reach a sink.
    pub fn new(samples: Vec<MetricSample>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Self { samples })
        }
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<MetricSample> {
        self.samples
    }
}

/// What the backend reported after accepting a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkResponse {
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
    pub seconds_spent: f64,
}

/// Failures a `MetricSink` can report. Delivery is all-or-nothing from the
/// dispatcher's point of view.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("connection to metric backend failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("metric backend did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("malformed response from metric backend: {0}")]
    Protocol(String),

    #[error("metric backend rejected the batch: {0}")]
    Rejected(String),
}

// =============================================================================
// Service Traits
// =============================================================================

/// The backend ingestion transport.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// A short name used for logging and metric labels.
    fn name(&self) -> &str;

    /// Delivers a batch of samples.
    ///
    /// # Returns
    /// * `Ok(SinkResponse)` once the backend acknowledged the whole batch
    /// * `Err(SinkError)` if the batch could not be delivered
    async fn send(&self, batch: &Batch) -> Result<SinkResponse, SinkError>;
}
