//! The Prometheus endpoint reflects pipeline activity.

use std::{net::SocketAddr, sync::Arc, time::Duration};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{app::TestAppBuilder, mock_sink::RecordingSink};

async fn scrape(addr: SocketAddr) -> String {
    reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap()
}

// The recorder is process-global, so everything is checked in one test.
#[tokio::test]
async fn test_metrics_endpoint_reports_pipeline_counters() {
    let sink = RecordingSink::gated();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .with_metrics_endpoint()
        .build()
        .await
        .unwrap();
    let metrics_addr = app.metrics_addr.expect("metrics endpoint should be bound");

    // The dispatcher picks up the first alert and stalls delivering it.
    app.post_alert(r#"{"alert_name":"DiskFull","sev":"CRIT"}"#).await;
    sink.wait_for_batches(1, Duration::from_secs(5)).await;

    // Alerts arriving meanwhile pile up and the depth gauge shows it.
    app.post_alert(r#"{"alert_name":"CpuHigh","sev":"WARN"}"#).await;
    app.post_alert(r#"{"alert_name":"MemHigh","sev":"WARN"}"#).await;
    app.post_alert("not json").await;
    assert_eq!(app.queue.len(), 2);
    let body = scrape(metrics_addr).await;
    assert!(body.contains("alert_queue_depth 2"), "{body}");

    sink.release(10);
    sink.wait_for_batches(2, Duration::from_secs(5)).await;

    // Give the dispatcher a moment to record the delivery.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let body = scrape(metrics_addr).await;

    assert!(body.contains("alerts_received_total 3"), "{body}");
    assert!(body.contains(r#"alerts_rejected_total{reason="malformed_body"} 1"#), "{body}");
    assert!(body.contains("batches_sent_total 2"), "{body}");
    assert!(body.contains("samples_sent_total 3"), "{body}");
    assert!(body.contains("alert_queue_depth 0"), "{body}");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}
