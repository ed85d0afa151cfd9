use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::JobStatus;

/// Response after submitting an evaluation.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Request to estimate the judging cost of one (model, prompt) pair.
#[derive(Debug, Deserialize, Validate)]
pub struct EstimateRequest {
    #[garde(range(min = 1))]
    pub model_id: i64,

    #[garde(range(min = 1))]
    pub prompt_id: i64,
}

/// Cost estimate for one pair. `estimated_cost_usd` is `None` when the model
/// has no stored response for the prompt.
#[derive(Debug, Serialize, Deserialize)]
pub struct EstimateResponse {
    pub model_id: i64,
    pub prompt_id: i64,
    pub estimated_cost_usd: Option<f64>,
    pub breakdown: std::collections::HashMap<String, f64>,
}
