//! Shutdown stops the receiver first and lets the dispatcher drain the queue.

use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use zabbix_webhook::queue::QueueError;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{app::TestAppBuilder, mock_sink::RecordingSink};

#[tokio::test]
async fn test_accepted_alerts_are_delivered_during_shutdown() {
    let sink = RecordingSink::gated();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap();

    app.post_alert(r#"{"alert_name":"a","sev":"CRIT"}"#).await;
    sink.wait_for_batches(1, Duration::from_secs(5)).await;
    for name in ["b", "c", "d"] {
        let body = format!(r#"{{"alert_name":"{name}","sev":"CRIT"}}"#);
        assert_eq!(app.post_alert(&body).await.status(), 200);
    }
    assert_eq!(app.queue.len(), 3);

    let queue = app.queue.clone();
    let shutdown = tokio::spawn(app.shutdown(Duration::from_secs(5)));
    sink.release(10);
    shutdown.await.unwrap().unwrap();

    assert!(queue.is_closed());
    assert_eq!(sink.sample_count(), 4);
}

#[tokio::test]
async fn test_queue_rejects_and_stays_closed_after_shutdown() {
    let sink = RecordingSink::new();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap();
    let queue = app.queue.clone();
    let addr = app.addr;

    app.shutdown(Duration::from_secs(5)).await.unwrap();

    // Closing an already closed, drained queue is a no-op.
    assert!(!queue.close());
    assert_eq!(timeout(Duration::from_secs(1), queue.dequeue()).await.unwrap(), None);
    assert_eq!(
        queue.enqueue(Default::default()).await,
        Err(QueueError::Closed)
    );

    // The listener is gone.
    let result = reqwest::Client::new()
        .post(format!("http://{addr}/alerts"))
        .body("{}")
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_idle_app_shuts_down_promptly() {
    let app = TestAppBuilder::new(Arc::new(RecordingSink::new()))
        .with_config(|config| config.idle_interval_ms = 60_000)
        .build()
        .await
        .unwrap();
    app.shutdown(Duration::from_secs(2)).await.unwrap();
}
