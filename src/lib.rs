//! zabbix-webhook - forwards alert webhooks to a Zabbix trapper
//!
//! Alerts arrive as JSON over HTTP, wait in a bounded queue, and are
//! batched into Zabbix sender packets by a single dispatcher task.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod ingest;
pub mod internal_metrics;
pub mod queue;
pub mod task_manager;
pub mod zabbix;

// Re-export core types for convenience
pub use crate::core::*;
