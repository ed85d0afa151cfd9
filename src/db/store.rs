use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{catalog_queries, queries};
use crate::models::evaluation::{NewEvaluationHistory, PromptRecord};
use crate::models::job::{EvaluationJob, JobStatus, NewEvaluationJob};

/// Storage handle shared by the job queue and the evaluator.
///
/// Every method is a single atomic statement; no transaction spans two calls.
/// Implementations must be safe for concurrent use by all workers.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    // ── evaluation_jobs ─────────────────────────────────────────────
    async fn insert_job(&self, job: &NewEvaluationJob) -> Result<EvaluationJob, StoreError>;
    async fn get_job(&self, job_id: Uuid) -> Result<EvaluationJob, StoreError>;
    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError>;
    async fn mark_job_running(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn update_job_progress(
        &self,
        job_id: Uuid,
        current: i64,
        total: i64,
        actual_cost: f64,
    ) -> Result<(), StoreError>;
    /// Jobs left `pending` or `running`, oldest first.
    async fn list_unfinished_jobs(&self) -> Result<Vec<EvaluationJob>, StoreError>;

    // ── catalog (read-only) ─────────────────────────────────────────
    async fn suite_for_model(&self, model_id: i64) -> Result<i64, StoreError>;
    async fn suite_for_prompt(&self, prompt_id: i64) -> Result<i64, StoreError>;
    async fn count_models(&self, suite_id: i64) -> Result<i64, StoreError>;
    async fn count_prompts(&self, suite_id: i64) -> Result<i64, StoreError>;
    async fn list_model_ids(&self, suite_id: i64) -> Result<Vec<i64>, StoreError>;
    async fn list_prompt_ids(&self, suite_id: i64) -> Result<Vec<i64>, StoreError>;
    async fn get_prompt(&self, prompt_id: i64) -> Result<Option<PromptRecord>, StoreError>;
    async fn get_model_response(&self, model_id: i64, prompt_id: i64) -> Result<Option<String>, StoreError>;
    /// Settings whose key starts with `prefix`, keyed by the full setting key.
    async fn settings_with_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, StoreError>;

    // ── results ─────────────────────────────────────────────────────
    async fn upsert_score(&self, model_id: i64, prompt_id: i64, score: i32) -> Result<(), StoreError>;
    async fn insert_history(&self, entry: &NewEvaluationHistory) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Failed to decode stored value: {0}")]
    Decode(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// PostgreSQL-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_job(&self, job: &NewEvaluationJob) -> Result<EvaluationJob, StoreError> {
        queries::create_job(&self.pool, job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<EvaluationJob, StoreError> {
        queries::get_job(&self.pool, job_id)
            .await?
            .ok_or_else(|| StoreError::not_found("job", job_id))
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        queries::update_job_status(&self.pool, job_id, status).await
    }

    async fn mark_job_running(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<(), StoreError> {
        queries::mark_job_running(&self.pool, job_id, started_at).await
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        queries::finish_job(&self.pool, job_id, status, error_message, completed_at).await
    }

    async fn update_job_progress(
        &self,
        job_id: Uuid,
        current: i64,
        total: i64,
        actual_cost: f64,
    ) -> Result<(), StoreError> {
        queries::update_job_progress(&self.pool, job_id, current, total, actual_cost).await
    }

    async fn list_unfinished_jobs(&self) -> Result<Vec<EvaluationJob>, StoreError> {
        queries::get_unfinished_jobs(&self.pool).await
    }

    async fn suite_for_model(&self, model_id: i64) -> Result<i64, StoreError> {
        catalog_queries::suite_for_model(&self.pool, model_id)
            .await?
            .ok_or_else(|| StoreError::not_found("model", model_id))
    }

    async fn suite_for_prompt(&self, prompt_id: i64) -> Result<i64, StoreError> {
        catalog_queries::suite_for_prompt(&self.pool, prompt_id)
            .await?
            .ok_or_else(|| StoreError::not_found("prompt", prompt_id))
    }

    async fn count_models(&self, suite_id: i64) -> Result<i64, StoreError> {
        Ok(catalog_queries::count_models(&self.pool, suite_id).await?)
    }

    async fn count_prompts(&self, suite_id: i64) -> Result<i64, StoreError> {
        Ok(catalog_queries::count_prompts(&self.pool, suite_id).await?)
    }

    async fn list_model_ids(&self, suite_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(catalog_queries::list_model_ids(&self.pool, suite_id).await?)
    }

    async fn list_prompt_ids(&self, suite_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(catalog_queries::list_prompt_ids(&self.pool, suite_id).await?)
    }

    async fn get_prompt(&self, prompt_id: i64) -> Result<Option<PromptRecord>, StoreError> {
        Ok(catalog_queries::get_prompt(&self.pool, prompt_id).await?)
    }

    async fn get_model_response(&self, model_id: i64, prompt_id: i64) -> Result<Option<String>, StoreError> {
        Ok(catalog_queries::get_model_response(&self.pool, model_id, prompt_id).await?)
    }

    async fn settings_with_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(catalog_queries::settings_with_prefix(&self.pool, prefix).await?)
    }

    async fn upsert_score(&self, model_id: i64, prompt_id: i64, score: i32) -> Result<(), StoreError> {
        Ok(catalog_queries::upsert_score(&self.pool, model_id, prompt_id, score).await?)
    }

    async fn insert_history(&self, entry: &NewEvaluationHistory) -> Result<(), StoreError> {
        Ok(catalog_queries::insert_history(&self.pool, entry).await?)
    }
}
