use super::supervisor::{format_uptime, Supervisor};
use crate::error::Error;
use crate::models::{BatchRequest, Frequency};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteParams {
    pub frequency: Option<String>,
}

/// Create the status/control router
pub fn create_router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/service/status", get(get_status))
        .route("/service/execute", post(execute))
        .route("/service/health", get(get_health))
        .with_state(supervisor)
}

async fn get_status(State(supervisor): State<Arc<Supervisor>>) -> Json<serde_json::Value> {
    let status = supervisor.status().snapshot();
    let uptime = Utc::now() - status.started_at;

    Json(json!({
        "service": "recurbot",
        "is_running": true,
        "uptime_seconds": uptime.num_seconds(),
        "uptime": format_uptime(uptime),
        "statistics": status,
    }))
}

/// Manual trigger; answers immediately, the batch continues in the background
async fn execute(
    State(supervisor): State<Arc<Supervisor>>,
    Query(params): Query<ExecuteParams>,
) -> Response {
    let mut request = BatchRequest::manual();
    if let Some(raw) = params.frequency.as_deref() {
        match raw.parse::<Frequency>() {
            Ok(frequency) => request = request.with_frequency(frequency),
            Err(message) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response();
            }
        }
    }

    match supervisor.try_start_batch(request) {
        Ok(_handle) => {
            tracing::info!("🎯 Manual batch triggered via API");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "started", "message": "Manual execution triggered" })),
            )
                .into_response()
        }
        Err(Error::AlreadyRunning) => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "rejected", "message": Error::AlreadyRunning.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn get_health(State(supervisor): State<Arc<Supervisor>>) -> Json<serde_json::Value> {
    let status = supervisor.status().snapshot();
    let state = match &status.health {
        None => "starting",
        Some(h) if h.is_healthy() => "healthy",
        Some(_) => "degraded",
    };

    Json(json!({
        "status": state,
        "batch_running": supervisor.is_batch_running(),
        "health": status.health,
        "timestamp": Utc::now(),
    }))
}
