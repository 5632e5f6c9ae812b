//! The HTTP receiver for alert webhooks.
//!
//! A single route, `/alerts`, accepts one JSON alert per POST and places it
//! on the alert queue. When the queue is full the request waits for room, so
//! a lagging backend shows up as slower responses rather than lost alerts.

use crate::core::AlertRecord;
use crate::internal_metrics::Metrics;
use crate::queue::AlertQueue;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

pub const ALERTS_PATH: &str = "/alerts";

/// Request bodies larger than this are refused.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Why a request was not turned into a queued alert.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported HTTP method {0}, only POST is accepted")]
    UnsupportedMethod(Method),

    #[error("failed to read request body")]
    BodyRead(#[source] axum::Error),

    #[error("request body is not valid json")]
    MalformedBody(#[source] serde_json::Error),

    #[error("alert queue is closed")]
    QueueClosed,
}

impl IngestError {
    fn status(&self) -> StatusCode {
        match self {
            IngestError::UnsupportedMethod(_)
            | IngestError::BodyRead(_)
            | IngestError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            IngestError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            IngestError::UnsupportedMethod(_) => "unsupported_method",
            IngestError::BodyRead(_) => "body_read",
            IngestError::MalformedBody(_) => "malformed_body",
            IngestError::QueueClosed => "queue_closed",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Shared state of the alert route.
#[derive(Clone, Debug)]
pub struct IngestionEndpoint {
    queue: AlertQueue,
    metrics: Arc<Metrics>,
}

impl IngestionEndpoint {
    pub fn new(queue: AlertQueue, metrics: Arc<Metrics>) -> Self {
        Self { queue, metrics }
    }

    /// Builds the router serving `/alerts`.
    pub fn router(self) -> Router {
        Router::new()
            .route(ALERTS_PATH, any(handle))
            .with_state(self)
    }

    /// Decodes one alert and enqueues it, waiting while the queue is full.
    pub async fn accept(&self, method: &Method, body: Body) -> Result<(), IngestError> {
        if method != Method::POST {
            return Err(IngestError::UnsupportedMethod(method.clone()));
        }

        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(IngestError::BodyRead)?;
        let record: AlertRecord =
            serde_json::from_slice(&bytes).map_err(IngestError::MalformedBody)?;
        debug!(alert_name = %record.alert_name, severity = %record.severity, "Received alert");

        self.queue
            .enqueue(record)
            .await
            .map_err(|_| IngestError::QueueClosed)?;
        self.metrics.alerts_received_total.increment(1);
        self.metrics.set_queue_depth(self.queue.len());
        Ok(())
    }
}

/// The `/alerts` handler.
pub async fn handle(State(endpoint): State<IngestionEndpoint>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    match endpoint.accept(&parts.method, body).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            match &e {
                IngestError::BodyRead(source) => {
                    error!(error = %source, "Failed to read alert request body")
                }
                IngestError::MalformedBody(source) => {
                    warn!(error = %source, "Error decoding alert")
                }
                other => warn!(error = %other, "Rejected alert request"),
            }
            endpoint.metrics.increment_rejected(e.reason());
            e.into_response()
        }
    }
}
