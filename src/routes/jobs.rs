use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::job::EvaluationJob;
use crate::routes::error_status;

/// GET /api/v1/jobs/{job_id} — current job record, including progress.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<EvaluationJob>, StatusCode> {
    state
        .evaluator
        .get_job_status(job_id)
        .await
        .map(Json)
        .map_err(|e| error_status(&e))
}

/// POST /api/v1/jobs/{job_id}/cancel — stop a running job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> StatusCode {
    match state.evaluator.cancel_job(job_id).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            tracing::info!(job_id = %job_id, error = %e, "Cancel rejected");
            error_status(&e)
        }
    }
}
