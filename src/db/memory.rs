//! In-process [`Store`] implementation.
//!
//! Holds the same tables as the PostgreSQL schema in plain collections behind a
//! mutex. Used by the test suite and for running the engine without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::store::{Store, StoreError};
use crate::models::evaluation::{EvaluationHistory, NewEvaluationHistory, PromptRecord};
use crate::models::job::{EvaluationJob, JobStatus, NewEvaluationJob};

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, EvaluationJob>,
    history: Vec<EvaluationHistory>,
    scores: BTreeMap<(i64, i64), i32>,
    prompts: BTreeMap<i64, PromptRecord>,
    models: BTreeMap<i64, i64>,
    responses: HashMap<(i64, i64), String>,
    settings: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_job_inserts: AtomicBool,
    fail_history_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── seeding ─────────────────────────────────────────────────────

    pub fn add_model(&self, model_id: i64, suite_id: i64) {
        self.tables().models.insert(model_id, suite_id);
    }

    pub fn add_prompt(&self, prompt: PromptRecord) {
        self.tables().prompts.insert(prompt.id, prompt);
    }

    pub fn add_response(&self, model_id: i64, prompt_id: i64, text: impl Into<String>) {
        self.tables().responses.insert((model_id, prompt_id), text.into());
    }

    pub fn set_setting(&self, key: impl Into<String>, value: impl Into<String>) {
        self.tables().settings.insert(key.into(), value.into());
    }

    /// Overwrite a stored job as-is, e.g. to simulate rows left behind by a crash.
    pub fn put_job(&self, job: EvaluationJob) {
        self.tables().jobs.insert(job.id, job);
    }

    // ── fault injection ─────────────────────────────────────────────

    pub fn fail_job_inserts(&self, fail: bool) {
        self.fail_job_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::SeqCst);
    }

    // ── inspection ──────────────────────────────────────────────────

    pub fn score(&self, model_id: i64, prompt_id: i64) -> Option<i32> {
        self.tables().scores.get(&(model_id, prompt_id)).copied()
    }

    pub fn score_count(&self) -> usize {
        self.tables().scores.len()
    }

    pub fn history(&self) -> Vec<EvaluationHistory> {
        self.tables().history.clone()
    }

    pub fn jobs(&self) -> Vec<EvaluationJob> {
        let mut jobs: Vec<_> = self.tables().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    fn with_job<F>(&self, job_id: Uuid, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut EvaluationJob),
    {
        let mut tables = self.tables();
        let job = tables
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::not_found("job", job_id))?;
        update(job);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_job(&self, job: &NewEvaluationJob) -> Result<EvaluationJob, StoreError> {
        if self.fail_job_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("job insert rejected".to_string()));
        }

        let row = EvaluationJob {
            id: Uuid::new_v4(),
            suite_id: job.suite_id,
            job_type: job.job_type.clone(),
            target_id: job.target_id,
            status: JobStatus::Pending,
            progress_current: 0,
            progress_total: job.progress_total,
            estimated_cost: job.estimated_cost,
            actual_cost: 0.0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.tables().jobs.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<EvaluationJob, StoreError> {
        self.tables()
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job", job_id))
    }

    async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
        self.with_job(job_id, |job| job.status = status)
    }

    async fn mark_job_running(&self, job_id: Uuid, started_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_job(job_id, |job| {
            job.status = JobStatus::Running;
            job.started_at = Some(started_at);
        })
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.with_job(job_id, |job| {
            job.status = status;
            if let Some(message) = error_message {
                job.error_message = Some(message.to_string());
            }
            job.completed_at = Some(completed_at);
        })
    }

    async fn update_job_progress(
        &self,
        job_id: Uuid,
        current: i64,
        total: i64,
        actual_cost: f64,
    ) -> Result<(), StoreError> {
        self.with_job(job_id, |job| {
            job.progress_current = current;
            job.progress_total = total;
            job.actual_cost = actual_cost;
        })
    }

    async fn list_unfinished_jobs(&self) -> Result<Vec<EvaluationJob>, StoreError> {
        Ok(self
            .jobs()
            .into_iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running))
            .collect())
    }

    async fn suite_for_model(&self, model_id: i64) -> Result<i64, StoreError> {
        self.tables()
            .models
            .get(&model_id)
            .copied()
            .ok_or_else(|| StoreError::not_found("model", model_id))
    }

    async fn suite_for_prompt(&self, prompt_id: i64) -> Result<i64, StoreError> {
        self.tables()
            .prompts
            .get(&prompt_id)
            .map(|p| p.suite_id)
            .ok_or_else(|| StoreError::not_found("prompt", prompt_id))
    }

    async fn count_models(&self, suite_id: i64) -> Result<i64, StoreError> {
        Ok(self.list_model_ids(suite_id).await?.len() as i64)
    }

    async fn count_prompts(&self, suite_id: i64) -> Result<i64, StoreError> {
        Ok(self.list_prompt_ids(suite_id).await?.len() as i64)
    }

    async fn list_model_ids(&self, suite_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .tables()
            .models
            .iter()
            .filter(|(_, suite)| **suite == suite_id)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn list_prompt_ids(&self, suite_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .tables()
            .prompts
            .values()
            .filter(|p| p.suite_id == suite_id)
            .map(|p| p.id)
            .collect())
    }

    async fn get_prompt(&self, prompt_id: i64) -> Result<Option<PromptRecord>, StoreError> {
        Ok(self.tables().prompts.get(&prompt_id).cloned())
    }

    async fn get_model_response(&self, model_id: i64, prompt_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self.tables().responses.get(&(model_id, prompt_id)).cloned())
    }

    async fn settings_with_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .tables()
            .settings
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn upsert_score(&self, model_id: i64, prompt_id: i64, score: i32) -> Result<(), StoreError> {
        self.tables().scores.insert((model_id, prompt_id), score);
        Ok(())
    }

    async fn insert_history(&self, entry: &NewEvaluationHistory) -> Result<(), StoreError> {
        if self.fail_history_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("history insert rejected".to_string()));
        }

        let mut tables = self.tables();
        let id = tables.history.len() as i64 + 1;
        tables.history.push(EvaluationHistory {
            id,
            entry: entry.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}
