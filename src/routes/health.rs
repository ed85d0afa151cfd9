use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: ComponentHealth,
    pub judge_service: ComponentHealth,
    pub queue: QueueHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub depth: usize,
    pub running: usize,
}

fn component<E>(result: Result<(), E>, start: std::time::Instant) -> ComponentHealth {
    match result {
        Ok(()) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(_) => ComponentHealth {
            status: "error".to_string(),
            latency_ms: None,
        },
    }
}

/// GET /health — dependency status of the evaluation engine.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_start = std::time::Instant::now();
    let db_check = component(state.store.ping().await, db_start);

    let judge_start = std::time::Instant::now();
    let judge_check = component(state.judge.health_check().await, judge_start);

    let queue = QueueHealth {
        depth: state.queue.queue_depth(),
        running: state.queue.running_job_ids().await.len(),
    };

    let all_healthy = db_check.status == "ok" && judge_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database: db_check,
            judge_service: judge_check,
            queue,
        },
    };

    (status_code, Json(response))
}
