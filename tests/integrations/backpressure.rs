//! A full queue makes new requests wait instead of dropping alerts.

use std::{sync::Arc, time::Duration};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{app::TestAppBuilder, mock_sink::RecordingSink};

#[tokio::test]
async fn test_full_queue_blocks_until_dispatcher_catches_up() {
    let sink = RecordingSink::gated();
    let app = TestAppBuilder::new(Arc::new(sink.clone()))
        .with_config(|config| config.queue_capacity = 1)
        .build()
        .await
        .unwrap();
    let app = Arc::new(app);

    // The dispatcher takes the first alert and gets stuck delivering it.
    app.post_alert(r#"{"alert_name":"first","sev":"CRIT"}"#).await;
    sink.wait_for_batches(1, Duration::from_secs(5)).await;

    // The second alert fills the only queue slot.
    let second = app.post_alert(r#"{"alert_name":"second","sev":"CRIT"}"#).await;
    assert_eq!(second.status(), 200);
    assert_eq!(app.queue.len(), 1);

    // The third has to wait for room.
    let blocked = {
        let app = app.clone();
        tokio::spawn(async move {
            app.post_alert(r#"{"alert_name":"third","sev":"CRIT"}"#)
                .await
                .status()
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!blocked.is_finished(), "request should wait while the queue is full");

    sink.release(10);
    let status = tokio::time::timeout(Duration::from_secs(5), blocked)
        .await
        .expect("request should be released once the queue drains")
        .unwrap();
    assert_eq!(status, 200);

    sink.wait_for_batches(2, Duration::from_secs(5)).await;
    let app = Arc::try_unwrap(app).ok().expect("no other app handles remain");
    app.shutdown(Duration::from_secs(5)).await.unwrap();

    let names: Vec<String> = sink
        .batches()
        .into_iter()
        .flatten()
        .map(|sample| sample.value)
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}
