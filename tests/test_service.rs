mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use chrono_tz::America::New_York;
use common::*;
use recurbot::config::ScheduleSettings;
use recurbot::error::Error;
use recurbot::models::BatchRequest;
use recurbot::service::{create_router, Supervisor};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn supervisor(h: &Harness) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(
        h.orchestrator.clone(),
        &ScheduleSettings::default(),
    ))
}

async fn call(sup: &Arc<Supervisor>, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = create_router(sup.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_idle(sup: &Arc<Supervisor>) {
    for _ in 0..200 {
        if !sup.is_batch_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch never finished");
}

#[tokio::test]
async fn test_second_trigger_rejected_while_running() {
    let h = harness(
        sample_rows(),
        MockBroker::new().with_submit_delay(Duration::from_millis(100)),
    );
    let sup = supervisor(&h);

    let handle = sup.try_start_batch(BatchRequest::manual()).unwrap();
    assert!(matches!(
        sup.try_start_batch(BatchRequest::manual()),
        Err(Error::AlreadyRunning)
    ));

    let (status, body) = call(&sup, "POST", "/service/execute").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "rejected");

    let result = handle.await.unwrap();
    assert_eq!(result.executed(), 2);

    // One audit line per order, no duplicates from the rejected triggers
    assert_eq!(h.ledger.row_log(2).len(), 1);
    assert_eq!(h.ledger.row_log(3).len(), 1);
    assert_eq!(h.broker.submissions().len(), 2);
    assert_eq!(h.sink.count(), 1);

    let status = sup.status().snapshot();
    assert_eq!(status.batches_run, 1);
    assert_eq!(status.batches_rejected, 2);
    assert!(!status.batch_running);
}

#[tokio::test]
async fn test_panicking_batch_clears_running_flag() {
    let h = harness(sample_rows(), MockBroker::new().panicking_submit());
    let sup = supervisor(&h);

    let handle = sup.try_start_batch(BatchRequest::manual()).unwrap();
    assert!(handle.await.unwrap_err().is_panic());

    assert!(!sup.is_batch_running());
    let (status, body) = call(&sup, "GET", "/service/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["statistics"]["batch_running"], false);
    assert!(sup.try_start_batch(BatchRequest::manual()).is_ok());
}

#[tokio::test]
async fn test_execute_endpoint_starts_batch() {
    let h = harness(sample_rows(), MockBroker::new());
    let sup = supervisor(&h);

    let (status, body) = call(&sup, "POST", "/service/execute").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");

    wait_idle(&sup).await;
    let snapshot = sup.status().snapshot();
    assert_eq!(snapshot.orders_executed, 2);
    assert_eq!(snapshot.last_batch.unwrap().succeeded, 2);

    // Guard released, so a new trigger is accepted again
    let (status, _) = call(&sup, "POST", "/service/execute?frequency=weekly").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_idle(&sup).await;
    assert_eq!(sup.status().snapshot().orders_executed, 3);
}

#[tokio::test]
async fn test_execute_rejects_unknown_frequency() {
    let h = harness(sample_rows(), MockBroker::new());
    let sup = supervisor(&h);

    let (status, body) = call(&sup, "POST", "/service/execute?frequency=yearly").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("yearly"));
    assert!(!sup.is_batch_running());
}

#[tokio::test]
async fn test_status_endpoint_reports_statistics() {
    let h = harness(sample_rows(), MockBroker::new());
    let sup = supervisor(&h);
    sup.run_batch_now(BatchRequest::manual()).await.unwrap();

    let (status, body) = call(&sup, "GET", "/service/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_running"], true);
    assert_eq!(body["statistics"]["batches_run"], 1);
    assert_eq!(body["statistics"]["orders_succeeded"], 2);
    assert_eq!(body["statistics"]["last_batch"]["trigger"], "manual");
}

#[tokio::test]
async fn test_health_endpoint_reflects_last_check() {
    let h = harness(sample_rows(), MockBroker::new());
    let sup = supervisor(&h);

    let (_, body) = call(&sup, "GET", "/service/health").await;
    assert_eq!(body["status"], "starting");

    let snapshot = sup.health_check().await;
    assert!(snapshot.is_healthy());
    assert_eq!(snapshot.active_orders, Some(2));

    let (status, body) = call(&sup, "GET", "/service/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    h.ledger.fail_reads(true);
    sup.health_check().await;
    let (_, body) = call(&sup, "GET", "/service/health").await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["health"]["ledger_ok"], false);
}

#[tokio::test]
async fn test_heartbeat_respects_quiet_hours() {
    let h = harness(sample_rows(), MockBroker::new());
    let sup = supervisor(&h);

    // 03:00 New York is inside quiet hours
    let night = New_York
        .with_ymd_and_hms(2024, 1, 3, 3, 0, 0)
        .unwrap()
        .with_timezone(&Utc);
    assert!(!sup.heartbeat(night).await);
    assert_eq!(h.sink.count(), 0);

    assert!(sup.heartbeat(wednesday_morning()).await);
    let message = h.sink.messages()[0].embeds[0].description.clone().unwrap();
    assert!(message.contains("Hourly Status Report"));
    assert!(message.contains("Active Orders: 2"));
}
