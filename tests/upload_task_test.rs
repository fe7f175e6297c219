//! Integration tests for the upload task against a mock endpoint

mod common;

use bytes::Bytes;
use common::{fast_policy, next_status, status_matching, MockEndpoint, Reply};
use gaze_sample_agent::uploader::{
    RetryPolicy, UploadClient, UploadCommand, UploadItem, UploadStatus, UploadTask,
};
use std::time::Duration;

fn item(endpoint: &str, tag: u8) -> UploadItem {
    UploadItem {
        samples: Bytes::from(vec![tag; 64]),
        endpoint: endpoint.to_string(),
        user_id: "user".to_string(),
        place_id: "place".to_string(),
        count: 1,
    }
}

fn client() -> UploadClient {
    UploadClient::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_successful_upload_reports_progress() {
    let mock = MockEndpoint::start(vec![]).await;
    let (commands, mut status, _join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 1)))
        .unwrap();

    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 1 });
    assert!(matches!(
        next_status(&mut status).await,
        UploadStatus::Ok { in_queue: 0, .. }
    ));
    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 0 });

    let received = mock.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, vec![1u8; 64]);
    assert_eq!(received[0].field.as_deref(), Some("chunk"));
    assert_eq!(received[0].file_name.as_deref(), Some("chunk.bin"));
    assert_eq!(
        received[0].content_type.as_deref(),
        Some("application/octet-stream")
    );
}

#[tokio::test]
async fn test_server_errors_retried_with_backoff() {
    let mock = MockEndpoint::start(vec![Reply::Status(500), Reply::Status(500)]).await;
    let (commands, mut status, _join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 2)))
        .unwrap();

    let done = status_matching(&mut status, |s| !matches!(s, UploadStatus::Start { .. })).await;
    assert!(matches!(done, UploadStatus::Ok { in_queue: 0, .. }));

    let received = mock.received();
    assert_eq!(received.len(), 3);
    assert!(received[1].at - received[0].at >= Duration::from_millis(10));
    assert!(received[2].at - received[1].at >= Duration::from_millis(20));
}

#[tokio::test]
async fn test_non_json_success_is_retried() {
    let mock = MockEndpoint::start(vec![Reply::NotJson]).await;
    let (commands, mut status, _join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 3)))
        .unwrap();

    let done = status_matching(&mut status, |s| !matches!(s, UploadStatus::Start { .. })).await;
    assert!(matches!(done, UploadStatus::Ok { .. }));
    assert_eq!(mock.received().len(), 2);
}

#[tokio::test]
async fn test_forbidden_requeues_at_head() {
    let mock = MockEndpoint::start(vec![
        Reply::Status(403),
        Reply::Status(403),
        Reply::Status(403),
    ])
    .await;
    let (commands, mut status, _join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 0xA)))
        .unwrap();
    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 0xB)))
        .unwrap();

    let failure = status_matching(&mut status, |s| matches!(s, UploadStatus::Error { .. })).await;
    match failure {
        UploadStatus::Error { code, message } => {
            assert_eq!(code, Some(403));
            assert!(message.contains("requeued"));
        }
        other => panic!("unexpected status {other:?}"),
    }

    // A is retried before B
    let ok_a = status_matching(&mut status, |s| matches!(s, UploadStatus::Ok { .. })).await;
    assert!(matches!(ok_a, UploadStatus::Ok { in_queue: 1, .. }));
    let ok_b = status_matching(&mut status, |s| matches!(s, UploadStatus::Ok { .. })).await;
    assert!(matches!(ok_b, UploadStatus::Ok { in_queue: 0, .. }));

    let received = mock.received();
    let tags: Vec<u8> = received.iter().map(|r| r.body[0]).collect();
    assert_eq!(tags, vec![0xA, 0xA, 0xA, 0xA, 0xB]);
    for pair in received[..4].windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(150));
    }
}

#[tokio::test]
async fn test_requeue_limit_drops_chunk() {
    let mock = MockEndpoint::start(vec![
        Reply::Status(500),
        Reply::Status(500),
        Reply::Status(500),
    ])
    .await;
    let policy = RetryPolicy {
        max_requeues: Some(1),
        ..fast_policy()
    };
    let (commands, mut status, _join) = UploadTask::spawn(client(), policy).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 4)))
        .unwrap();

    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 1 });
    match next_status(&mut status).await {
        UploadStatus::Error { code, message } => {
            assert_eq!(code, Some(500));
            assert!(message.contains("Dropping"));
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 0 });
    assert_eq!(mock.received().len(), 3);
}

#[tokio::test]
async fn test_connection_refused_has_no_code() {
    let policy = RetryPolicy {
        max_requeues: Some(1),
        ..fast_policy()
    };
    let (commands, mut status, _join) = UploadTask::spawn(client(), policy).into_parts();

    commands
        .send(UploadCommand::Enqueue(item("http://127.0.0.1:1/samples", 5)))
        .unwrap();

    let failure = status_matching(&mut status, |s| matches!(s, UploadStatus::Error { .. })).await;
    assert!(matches!(failure, UploadStatus::Error { code: None, .. }));
}

#[tokio::test]
async fn test_stop_aborts_in_flight_upload() {
    let mock = MockEndpoint::start(vec![Reply::Hang(Duration::from_secs(30))]).await;
    let (commands, mut status, join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 6)))
        .unwrap();
    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 1 });
    mock.wait_for(1, Duration::from_secs(5)).await;

    commands.send(UploadCommand::Stop).unwrap();
    tokio::time::timeout(Duration::from_secs(2), join)
        .await
        .expect("task did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_enqueue_accepted_during_upload() {
    let mock = MockEndpoint::start(vec![Reply::Hang(Duration::from_millis(200))]).await;
    let (commands, mut status, _join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 7)))
        .unwrap();
    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 1 });
    mock.wait_for(1, Duration::from_secs(5)).await;

    commands
        .send(UploadCommand::Enqueue(item(&mock.url(), 8)))
        .unwrap();

    assert!(matches!(
        next_status(&mut status).await,
        UploadStatus::Ok { in_queue: 1, .. }
    ));
    assert_eq!(next_status(&mut status).await, UploadStatus::Start { in_queue: 1 });
    assert!(matches!(
        next_status(&mut status).await,
        UploadStatus::Ok { in_queue: 0, .. }
    ));
}

#[tokio::test]
async fn test_dropping_senders_drains_queue() {
    let mock = MockEndpoint::start(vec![]).await;
    let (commands, _status, join) = UploadTask::spawn(client(), fast_policy()).into_parts();

    for tag in [9, 10, 11] {
        commands
            .send(UploadCommand::Enqueue(item(&mock.url(), tag)))
            .unwrap();
    }
    drop(commands);

    tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("task did not exit")
        .unwrap();

    let tags: Vec<u8> = mock.received().iter().map(|r| r.body[0]).collect();
    assert_eq!(tags, vec![9, 10, 11]);
}
