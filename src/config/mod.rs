use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

use crate::services::evaluator::{EvaluatorSettings, DEFAULT_COST_PER_UNIT};
use crate::services::judge;
use crate::services::queue::{self, QueueSettings};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// PostgreSQL connection string
    #[garde(length(min = 1))]
    pub database_url: String,

    /// Base URL of the judge scoring service
    #[serde(default = "default_judge_service_url")]
    #[garde(length(min = 1))]
    pub judge_service_url: String,

    /// Per-request timeout for judge service calls, in seconds
    #[serde(default = "default_judge_timeout_secs")]
    #[garde(range(min = 1, max = 3600))]
    pub judge_timeout_secs: u64,

    /// Number of concurrent evaluation workers
    #[serde(default = "default_worker_count")]
    #[garde(range(min = 1, max = 64))]
    pub worker_count: usize,

    /// Jobs buffered before submissions wait
    #[serde(default = "default_queue_capacity")]
    #[garde(range(min = 1, max = 10_000))]
    pub queue_capacity: usize,

    /// Delay before unfinished jobs are re-admitted at startup, in milliseconds
    #[serde(default = "default_resume_delay_ms")]
    #[garde(skip)]
    pub resume_delay_ms: u64,

    /// Estimated judging cost per (model, prompt) pair in USD
    #[serde(default = "default_cost_per_unit_usd")]
    #[garde(range(min = 0.0))]
    pub cost_per_unit_usd: f64,

    /// Judge names sent with every evaluation (comma-separated in the environment)
    #[serde(default = "default_judges")]
    #[garde(length(min = 1))]
    pub judges: Vec<String>,

    /// Providers whose `api_key_<provider>` settings are forwarded to the judge service
    #[serde(default = "default_api_key_providers")]
    #[garde(skip)]
    pub api_key_providers: Vec<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_judge_service_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_judge_timeout_secs() -> u64 {
    judge::DEFAULT_TIMEOUT.as_secs()
}

fn default_worker_count() -> usize {
    queue::DEFAULT_WORKER_COUNT
}

fn default_queue_capacity() -> usize {
    queue::DEFAULT_CAPACITY
}

fn default_resume_delay_ms() -> u64 {
    queue::DEFAULT_RESUME_DELAY.as_millis() as u64
}

fn default_cost_per_unit_usd() -> f64 {
    DEFAULT_COST_PER_UNIT
}

fn default_judges() -> Vec<String> {
    EvaluatorSettings::default().judges
}

fn default_api_key_providers() -> Vec<String> {
    EvaluatorSettings::default().api_key_providers
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit `(NAME, value)` pairs, as found in the environment.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            worker_count: self.worker_count,
            capacity: self.queue_capacity,
            resume_delay: Duration::from_millis(self.resume_delay_ms),
        }
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            judges: self.judges.clone(),
            api_key_providers: self.api_key_providers.clone(),
            cost_per_unit: self.cost_per_unit_usd,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
