use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Lifecycle status of an evaluation job.
///
/// `pending -> running -> completed | failed | cancelled`. Terminal states are
/// never left again; a restarted process re-admits `pending` and `running`
/// rows as `pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// What a job evaluates. Persisted as its snake_case tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    /// Every model of a suite against every prompt of that suite.
    All,
    /// One model against every prompt of its suite.
    Model,
    /// Every model of a suite against one prompt.
    Prompt,
}

/// A persisted evaluation job.
///
/// `job_type` is kept as the stored tag; it is parsed into a [`JobType`] when
/// the job is dispatched so rows written by other versions fail the job
/// instead of failing the read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationJob {
    pub id: Uuid,
    pub suite_id: i64,
    pub job_type: String,
    pub target_id: Option<i64>,
    pub status: JobStatus,
    pub progress_current: i64,
    pub progress_total: i64,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvaluationJob {
    pub fn kind(&self) -> Result<JobType, strum::ParseError> {
        self.job_type.parse()
    }
}

/// Fields supplied when a job is submitted; the store fills in the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvaluationJob {
    pub suite_id: i64,
    pub job_type: String,
    pub target_id: Option<i64>,
    pub progress_total: i64,
    pub estimated_cost: f64,
}

impl NewEvaluationJob {
    pub fn new(
        suite_id: i64,
        job_type: JobType,
        target_id: Option<i64>,
        progress_total: i64,
        estimated_cost: f64,
    ) -> Self {
        Self {
            suite_id,
            job_type: job_type.to_string(),
            target_id,
            progress_total,
            estimated_cost,
        }
    }
}
