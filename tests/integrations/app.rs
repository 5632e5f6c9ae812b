use std::{sync::Arc, time::Duration};
use zabbix_webhook::core::MetricSample;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{
    app::TestAppBuilder,
    fake_zabbix::{FakeZabbixServer, Reply},
    mock_sink::RecordingSink,
};

const DISK_FULL: &str = r#"{"alert_type":"x","alert_name":"DiskFull","sev":"CRIT","messages":"m"}"#;

#[tokio::test]
async fn test_alert_is_forwarded_as_single_sample() {
    let sink = RecordingSink::new();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap();

    let response = app.post_alert(DISK_FULL).await;
    assert_eq!(response.status(), 200);

    sink.wait_for_batches(1, Duration::from_secs(5)).await;
    assert_eq!(
        sink.batches(),
        vec![vec![MetricSample::new("zabbix_host", "prometheus.CRIT", "DiskFull")]]
    );

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_empty_host_annotation_never_reaches_sink() {
    let sink = RecordingSink::new();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .with_config(|config| config.zabbix_host_annotation = String::new())
        .build()
        .await
        .unwrap();

    let response = app.post_alert(DISK_FULL).await;
    assert_eq!(response.status(), 200);

    let queue = app.queue.clone();
    app.shutdown(Duration::from_secs(5)).await.unwrap();

    // The record was consumed, but nothing was sent for it.
    assert!(queue.is_empty());
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn test_alerts_arriving_during_a_flush_are_coalesced() {
    let sink = RecordingSink::gated();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap();

    // The first alert is flushed on its own and held inside the sink.
    app.post_alert(DISK_FULL).await;
    sink.wait_for_batches(1, Duration::from_secs(5)).await;

    // Both of these land in the queue before the next flush opportunity.
    let second = app
        .post_alert(r#"{"alert_name":"CpuHigh","sev":"WARN"}"#)
        .await;
    let third = app
        .post_alert(r#"{"alert_name":"MemLow","sev":"INFO"}"#)
        .await;
    assert_eq!(second.status(), 200);
    assert_eq!(third.status(), 200);

    sink.release(10);
    sink.wait_for_batches(2, Duration::from_secs(5)).await;

    let batches = sink.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 2);
    assert_eq!(batches[1][0].key, "prometheus.WARN");
    assert_eq!(batches[1][1].value, "MemLow");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_bad_requests_do_not_touch_the_queue() {
    let sink = RecordingSink::gated();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap();
    let client = reqwest::Client::new();

    let get = client.get(app.alerts_url()).send().await.unwrap();
    assert_eq!(get.status(), 400);

    let malformed = app.post_alert("{not json").await;
    assert_eq!(malformed.status(), 400);
    assert_eq!(malformed.text().await.unwrap(), "request body is not valid json");

    assert!(app.queue.is_empty());
    app.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn test_sink_failure_is_invisible_to_callers() {
    let sink = RecordingSink::failing();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap();

    assert_eq!(app.post_alert(DISK_FULL).await.status(), 200);
    sink.wait_for_batches(1, Duration::from_secs(5)).await;
    assert_eq!(app.post_alert(DISK_FULL).await.status(), 200);
    sink.wait_for_batches(2, Duration::from_secs(5)).await;

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_end_to_end_with_zabbix_trapper() {
    let server = FakeZabbixServer::start(Reply::Success).await;
    let app = TestAppBuilder::new(Arc::new(RecordingSink::new()))
        .with_zabbix_server(server.addr)
        .build()
        .await
        .unwrap();

    assert_eq!(app.post_alert(DISK_FULL).await.status(), 200);
    app.shutdown(Duration::from_secs(5)).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let data = requests[0]["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["host"], "zabbix_host");
    assert_eq!(data[0]["key"], "prometheus.CRIT");
    assert_eq!(data[0]["value"], "DiskFull");
}
