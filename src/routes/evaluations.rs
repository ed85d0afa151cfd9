use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{EstimateRequest, EstimateResponse, SubmitResponse};
use crate::models::job::JobStatus;
use crate::routes::error_status;
use crate::services::evaluator::EvaluatorError;

fn submitted(
    result: Result<Uuid, EvaluatorError>,
    what: String,
) -> Result<(StatusCode, Json<SubmitResponse>), StatusCode> {
    let job_id = result.map_err(|e| {
        tracing::warn!(error = %e, subject = %what, "Evaluation submission rejected");
        error_status(&e)
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id,
            status: JobStatus::Pending,
            message: format!("Evaluation of {} queued", what),
        }),
    ))
}

/// POST /api/v1/suites/{suite_id}/evaluate — every model against every prompt.
pub async fn evaluate_suite(
    State(state): State<AppState>,
    Path(suite_id): Path<i64>,
) -> Result<(StatusCode, Json<SubmitResponse>), StatusCode> {
    submitted(
        state.evaluator.evaluate_all(suite_id).await,
        format!("suite {}", suite_id),
    )
}

/// POST /api/v1/models/{model_id}/evaluate
pub async fn evaluate_model(
    State(state): State<AppState>,
    Path(model_id): Path<i64>,
) -> Result<(StatusCode, Json<SubmitResponse>), StatusCode> {
    submitted(
        state.evaluator.evaluate_model(model_id).await,
        format!("model {}", model_id),
    )
}

/// POST /api/v1/prompts/{prompt_id}/evaluate
pub async fn evaluate_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<i64>,
) -> Result<(StatusCode, Json<SubmitResponse>), StatusCode> {
    submitted(
        state.evaluator.evaluate_prompt(prompt_id).await,
        format!("prompt {}", prompt_id),
    )
}

/// POST /api/v1/estimate — judging cost of one pair.
pub async fn estimate_pair(
    State(state): State<AppState>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<EstimateResponse>, StatusCode> {
    request.validate().map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let estimate = state
        .evaluator
        .estimate_pair_cost(request.model_id, request.prompt_id)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Cost estimate failed");
            error_status(&e)
        })?;

    let (estimated_cost_usd, breakdown) = match estimate {
        Some(e) => (Some(e.estimated_cost), e.breakdown),
        None => (None, Default::default()),
    };

    Ok(Json(EstimateResponse {
        model_id: request.model_id,
        prompt_id: request.prompt_id,
        estimated_cost_usd,
        breakdown,
    }))
}
