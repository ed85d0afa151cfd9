use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// One judge's opinion on a candidate response, as returned by the judge service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeResult {
    pub judge: String,
    /// A judge that failed may report `null`; it then reads as 0 and is
    /// dropped by the consensus filter.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(rename = "cost_usd", default, deserialize_with = "null_as_zero")]
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRequest {
    pub prompt: String,
    pub response: String,
    pub solution: String,
    #[serde(rename = "type")]
    pub prompt_type: String,
    pub judges: Vec<String>,
    pub api_keys: HashMap<String, String>,
}

/// Response of `POST /evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResponse {
    pub results: Vec<JudgeResult>,
    #[serde(rename = "total_cost_usd", default)]
    pub total_cost: f64,
    #[serde(default)]
    pub consensus_score: f64,
    #[serde(default)]
    pub avg_confidence: f64,
}

/// Body of `POST /estimate_cost`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostEstimateRequest {
    pub prompt: String,
    pub response: String,
    pub solution: String,
    #[serde(rename = "type")]
    pub prompt_type: String,
    pub judges: Vec<String>,
}

/// Response of `POST /estimate_cost`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostEstimateResponse {
    #[serde(rename = "estimated_cost_usd")]
    pub estimated_cost: f64,
    #[serde(default)]
    pub breakdown: HashMap<String, f64>,
}

/// The parts of a prompt a judge needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRecord {
    pub id: i64,
    pub suite_id: i64,
    pub text: String,
    pub solution: String,
    pub prompt_type: String,
}

/// Audit row for one judge's opinion within a job. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvaluationHistory {
    pub job_id: Uuid,
    pub model_id: i64,
    pub prompt_id: i64,
    pub judge_name: String,
    pub judge_score: f64,
    pub judge_confidence: f64,
    pub judge_reasoning: String,
    pub cost: f64,
}

impl NewEvaluationHistory {
    pub fn from_result(job_id: Uuid, model_id: i64, prompt_id: i64, result: &JudgeResult) -> Self {
        Self {
            job_id,
            model_id,
            prompt_id,
            judge_name: result.judge.clone(),
            judge_score: result.score,
            judge_confidence: result.confidence,
            judge_reasoning: result.reasoning.clone(),
            cost: result.cost,
        }
    }
}

/// A stored history row.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationHistory {
    pub id: i64,
    pub entry: NewEvaluationHistory,
    pub created_at: DateTime<Utc>,
}
