//! A `MetricSink` speaking the Zabbix trapper ("sender") protocol.
//!
//! Every batch is sent over a fresh TCP connection as one packet:
//!
//! ```text
//! "ZBXD" | 0x01 | payload length (u64, little endian) | JSON payload
//! ```
//!
//! The server answers with a packet framed the same way whose JSON body
//! carries `response` and a human readable `info` summary.

use crate::core::{Batch, MetricSample, MetricSink, SinkError, SinkResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

const HEADER_MAGIC: &[u8; 4] = b"ZBXD";
const HEADER_FLAGS: u8 = 0x01;
const HEADER_LEN: usize = 13;
/// Responses larger than this are treated as a protocol violation.
const MAX_RESPONSE_LEN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Serialize)]
struct SenderRequest<'a> {
    request: &'static str,
    data: &'a [MetricSample],
    clock: i64,
}

#[derive(Debug, Deserialize)]
struct SenderResponse {
    response: String,
    #[serde(default)]
    info: String,
}

/// Wraps a JSON payload into a trapper packet.
pub fn encode_packet(payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + payload.len());
    packet.extend_from_slice(HEADER_MAGIC);
    packet.push(HEADER_FLAGS);
    packet.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Builds the full packet for a batch, stamped with `clock`.
pub fn encode_batch(batch: &Batch, clock: i64) -> Result<Vec<u8>, SinkError> {
    let request = SenderRequest {
        request: "sender data",
        data: batch.samples(),
        clock,
    };
    let payload = serde_json::to_vec(&request)?;
    Ok(encode_packet(&payload))
}

/// Validates a packet header and returns the announced payload length.
fn decode_header(header: &[u8; HEADER_LEN]) -> Result<u64, SinkError> {
    if &header[..4] != HEADER_MAGIC {
        return Err(SinkError::Protocol("missing ZBXD header".to_string()));
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&header[5..]);
    let len = u64::from_le_bytes(len);
    if len > MAX_RESPONSE_LEN {
        return Err(SinkError::Protocol(format!("response too large ({len} bytes)")));
    }
    Ok(len)
}

/// Parses a `processed: 1; failed: 0; total: 1; seconds spent: 0.000055`
/// summary. Unknown or malformed fields are left at their defaults.
pub fn parse_info(info: &str) -> SinkResponse {
    let mut response = SinkResponse::default();
    for part in info.split(';') {
        let Some((name, value)) = part.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match name.trim() {
            "processed" => response.processed = value.parse().unwrap_or_default(),
            "failed" => response.failed = value.parse().unwrap_or_default(),
            "total" => response.total = value.parse().unwrap_or_default(),
            "seconds spent" => response.seconds_spent = value.parse().unwrap_or_default(),
            _ => {}
        }
    }
    response
}

/// Sends batches to a Zabbix server or proxy.
#[derive(Debug, Clone)]
pub struct ZabbixSender {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ZabbixSender {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(10),
        }
    }

    /// Bounds connect, write and read of a single send.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn exchange(&self, packet: &[u8]) -> Result<SinkResponse, SinkError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(packet).await?;
        stream.flush().await?;

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let len = decode_header(&header)?;

        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await?;

        let response: SenderResponse = serde_json::from_slice(&body)
            .map_err(|e| SinkError::Protocol(format!("invalid response body: {e}")))?;
        debug!(response = %response.response, info = %response.info, "Zabbix answered");

        if response.response != "success" {
            return Err(SinkError::Rejected(format!(
                "{} {}",
                response.response, response.info
            )));
        }
        Ok(parse_info(&response.info))
    }
}

#[async_trait]
impl MetricSink for ZabbixSender {
    fn name(&self) -> &str {
        "zabbix"
    }

    #[instrument(skip(self, batch), fields(address = %self.address(), count = batch.len()))]
    async fn send(&self, batch: &Batch) -> Result<SinkResponse, SinkError> {
        let packet = encode_batch(batch, chrono::Utc::now().timestamp())?;
        match tokio::time::timeout(self.timeout, self.exchange(&packet)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.timeout)),
        }
    }
}
