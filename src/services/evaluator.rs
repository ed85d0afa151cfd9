use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::store::{Store, StoreError};
use crate::models::evaluation::{
    CostEstimateRequest, CostEstimateResponse, EvaluationRequest, NewEvaluationHistory,
};
use crate::models::job::{EvaluationJob, JobType, NewEvaluationJob};
use crate::services::consensus::{calculate_consensus_score, round_to_valid_score};
use crate::services::judge::{JudgeError, JudgeServiceClient};
use crate::services::queue::{CancelSignal, JobProcessor, JobQueue, ProcessError, QueueError};

/// Rough judging cost of one (model, prompt) pair, used for up-front estimates.
pub const DEFAULT_COST_PER_UNIT: f64 = 0.05;

const API_KEY_PREFIX: &str = "api_key_";

/// What the evaluator sends to the judge service besides the pair itself.
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub judges: Vec<String>,
    /// Providers forwarded as `api_keys`; missing settings become empty strings.
    pub api_key_providers: Vec<String>,
    pub cost_per_unit: f64,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            judges: vec![
                "claude-sonnet-4".to_string(),
                "gpt-4o".to_string(),
                "gemini-2.5-pro".to_string(),
            ],
            api_key_providers: vec![
                "anthropic".to_string(),
                "openai".to_string(),
                "google".to_string(),
            ],
            cost_per_unit: DEFAULT_COST_PER_UNIT,
        }
    }
}

/// Turns evaluation requests into jobs and executes them on queue workers.
pub struct Evaluator {
    store: Arc<dyn Store>,
    queue: Arc<JobQueue>,
    judge: Arc<JudgeServiceClient>,
    settings: EvaluatorSettings,
}

impl Evaluator {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<JobQueue>,
        judge: Arc<JudgeServiceClient>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            store,
            queue,
            judge,
            settings,
        }
    }

    // ── submission ──────────────────────────────────────────────────

    /// Every model of the suite against every prompt of the suite.
    pub async fn evaluate_all(&self, suite_id: i64) -> Result<Uuid, EvaluatorError> {
        let prompts = self.store.count_prompts(suite_id).await?;
        let models = self.store.count_models(suite_id).await?;

        self.submit(suite_id, JobType::All, None, prompts * models).await
    }

    /// One model against every prompt of its suite.
    pub async fn evaluate_model(&self, model_id: i64) -> Result<Uuid, EvaluatorError> {
        let suite_id = self.store.suite_for_model(model_id).await?;
        let prompts = self.store.count_prompts(suite_id).await?;

        self.submit(suite_id, JobType::Model, Some(model_id), prompts).await
    }

    /// Every model of the prompt's suite against one prompt.
    pub async fn evaluate_prompt(&self, prompt_id: i64) -> Result<Uuid, EvaluatorError> {
        let suite_id = self.store.suite_for_prompt(prompt_id).await?;
        let models = self.store.count_models(suite_id).await?;

        self.submit(suite_id, JobType::Prompt, Some(prompt_id), models).await
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<EvaluationJob, EvaluatorError> {
        Ok(self.queue.get_job(job_id).await?)
    }

    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), EvaluatorError> {
        Ok(self.queue.cancel_job(job_id).await?)
    }

    /// Ask the judge service what scoring one pair would cost.
    ///
    /// Returns `None` when the model has no response for the prompt.
    pub async fn estimate_pair_cost(
        &self,
        model_id: i64,
        prompt_id: i64,
    ) -> Result<Option<CostEstimateResponse>, EvaluatorError> {
        let prompt = self
            .store
            .get_prompt(prompt_id)
            .await?
            .ok_or(EvaluatorError::PromptNotFound(prompt_id))?;

        let Some(response) = self.store.get_model_response(model_id, prompt_id).await? else {
            return Ok(None);
        };

        let request = CostEstimateRequest {
            prompt: prompt.text,
            response,
            solution: prompt.solution,
            prompt_type: prompt.prompt_type,
            judges: self.settings.judges.clone(),
        };

        Ok(Some(self.judge.estimate_cost(&request).await?))
    }

    async fn submit(
        &self,
        suite_id: i64,
        job_type: JobType,
        target_id: Option<i64>,
        units: i64,
    ) -> Result<Uuid, EvaluatorError> {
        let estimated_cost = units as f64 * self.settings.cost_per_unit;
        let job = NewEvaluationJob::new(suite_id, job_type, target_id, units, estimated_cost);

        let job_id = self.queue.enqueue(job).await?;
        info!(
            job_id = %job_id,
            suite_id,
            job_type = %job_type,
            units,
            estimated_cost,
            "Evaluation submitted"
        );
        Ok(job_id)
    }

    // ── execution ───────────────────────────────────────────────────

    /// Run a job to the end, or until cancellation is observed.
    ///
    /// Only an unusable job (unknown type, missing target) or cancellation
    /// stops the run; failures of individual pairs are logged and skipped.
    pub async fn process_job(
        &self,
        job: &EvaluationJob,
        cancel: &mut CancelSignal,
    ) -> Result<(), EvaluatorError> {
        let job_type: JobType = job
            .kind()
            .map_err(|_| EvaluatorError::UnsupportedJobType(job.job_type.clone()))?;

        match job_type {
            JobType::All => self.process_all_job(job, cancel).await,
            JobType::Model => self.process_model_job(job, cancel).await,
            JobType::Prompt => self.process_prompt_job(job, cancel).await,
        }
    }

    async fn process_all_job(&self, job: &EvaluationJob, cancel: &mut CancelSignal) -> Result<(), EvaluatorError> {
        let model_ids = self.store.list_model_ids(job.suite_id).await?;
        let prompt_ids = self.store.list_prompt_ids(job.suite_id).await?;

        let pairs: Vec<(i64, i64)> = model_ids
            .iter()
            .flat_map(|&model_id| prompt_ids.iter().map(move |&prompt_id| (model_id, prompt_id)))
            .collect();

        self.run_units(job, &pairs, cancel).await
    }

    async fn process_model_job(&self, job: &EvaluationJob, cancel: &mut CancelSignal) -> Result<(), EvaluatorError> {
        let model_id = job.target_id.ok_or(EvaluatorError::MissingTarget(job.id))?;
        let prompt_ids = self.store.list_prompt_ids(job.suite_id).await?;

        let pairs: Vec<(i64, i64)> = prompt_ids.into_iter().map(|p| (model_id, p)).collect();
        self.run_units(job, &pairs, cancel).await
    }

    async fn process_prompt_job(&self, job: &EvaluationJob, cancel: &mut CancelSignal) -> Result<(), EvaluatorError> {
        let prompt_id = job.target_id.ok_or(EvaluatorError::MissingTarget(job.id))?;
        let model_ids = self.store.list_model_ids(job.suite_id).await?;

        let pairs: Vec<(i64, i64)> = model_ids.into_iter().map(|m| (m, prompt_id)).collect();
        self.run_units(job, &pairs, cancel).await
    }

    async fn run_units(
        &self,
        job: &EvaluationJob,
        pairs: &[(i64, i64)],
        cancel: &mut CancelSignal,
    ) -> Result<(), EvaluatorError> {
        let total = pairs.len() as i64;
        let mut current = 0_i64;
        let mut total_cost = 0.0_f64;

        for &(model_id, prompt_id) in pairs {
            if cancel.is_cancelled() {
                info!(job_id = %job.id, current, total, "Job cancelled, stopping");
                return Err(EvaluatorError::Cancelled);
            }

            match self.evaluate_model_prompt_pair(job.id, model_id, prompt_id).await {
                Ok(cost) => total_cost += cost,
                Err(e) => {
                    metrics::counter!("evaluation_pairs_total", "outcome" => "failed").increment(1);
                    warn!(
                        job_id = %job.id,
                        model_id,
                        prompt_id,
                        error = %e,
                        "Pair evaluation failed, continuing"
                    );
                }
            }

            current += 1;
            if let Err(e) = self
                .queue
                .update_job_progress(job.id, current, total, total_cost)
                .await
            {
                warn!(job_id = %job.id, error = %e, "Failed to record job progress");
            }
        }

        info!(job_id = %job.id, units = total, actual_cost = total_cost, "All units attempted");
        Ok(())
    }

    /// Judge one model's response to one prompt and store the consensus score.
    ///
    /// Returns the judging cost. A pair without a stored response is skipped at
    /// zero cost.
    pub async fn evaluate_model_prompt_pair(
        &self,
        job_id: Uuid,
        model_id: i64,
        prompt_id: i64,
    ) -> Result<f64, EvaluatorError> {
        let prompt = self
            .store
            .get_prompt(prompt_id)
            .await?
            .ok_or(EvaluatorError::PromptNotFound(prompt_id))?;

        let Some(response) = self.store.get_model_response(model_id, prompt_id).await? else {
            debug!(job_id = %job_id, model_id, prompt_id, "No response stored, skipping pair");
            metrics::counter!("evaluation_pairs_total", "outcome" => "skipped").increment(1);
            return Ok(0.0);
        };

        let request = EvaluationRequest {
            prompt: prompt.text,
            response,
            solution: prompt.solution,
            prompt_type: prompt.prompt_type,
            judges: self.settings.judges.clone(),
            api_keys: self.api_keys().await,
        };

        let start = Instant::now();
        let evaluation = self.judge.evaluate(&request).await?;
        metrics::histogram!("evaluation_pair_seconds").record(start.elapsed().as_secs_f64());

        let score = round_to_valid_score(calculate_consensus_score(&evaluation.results));
        self.store.upsert_score(model_id, prompt_id, score).await?;

        for result in &evaluation.results {
            let entry = NewEvaluationHistory::from_result(job_id, model_id, prompt_id, result);
            if let Err(e) = self.store.insert_history(&entry).await {
                warn!(
                    job_id = %job_id,
                    model_id,
                    prompt_id,
                    judge = %result.judge,
                    error = %e,
                    "Failed to record evaluation history"
                );
            }
        }

        metrics::counter!("evaluation_pairs_total", "outcome" => "scored").increment(1);
        debug!(
            job_id = %job_id,
            model_id,
            prompt_id,
            score,
            cost = evaluation.total_cost,
            judges = evaluation.results.len(),
            "Pair scored"
        );

        Ok(evaluation.total_cost)
    }

    /// Configured provider keys, as stored. Decryption is the settings layer's job.
    async fn api_keys(&self) -> HashMap<String, String> {
        let mut stored = match self.store.settings_with_prefix(API_KEY_PREFIX).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to read API keys, sending none");
                HashMap::new()
            }
        };

        self.settings
            .api_key_providers
            .iter()
            .map(|provider| {
                let key = stored
                    .remove(&format!("{}{}", API_KEY_PREFIX, provider))
                    .unwrap_or_default();
                (provider.clone(), key)
            })
            .collect()
    }
}

#[async_trait]
impl JobProcessor for Evaluator {
    async fn process(&self, job: &EvaluationJob, cancel: &mut CancelSignal) -> Result<(), ProcessError> {
        self.process_job(job, cancel).await.map_err(|e| match e {
            EvaluatorError::Cancelled => ProcessError::Cancelled,
            other => ProcessError::Failed(other.to_string()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Judge service error: {0}")]
    Judge(#[from] JudgeError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("prompt {0} not found")]
    PromptNotFound(i64),

    #[error("job {0} has no target id")]
    MissingTarget(Uuid),

    #[error("unsupported job type: {0}")]
    UnsupportedJobType(String),

    #[error("job cancelled")]
    Cancelled,
}
