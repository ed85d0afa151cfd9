//! Shared builders and polling helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{sleep, timeout};
use uuid::Uuid;
use wiremock::MockServer;

use tournament_eval::db::{MemoryStore, Store};
use tournament_eval::models::evaluation::PromptRecord;
use tournament_eval::models::job::{EvaluationJob, JobStatus};
use tournament_eval::services::evaluator::{Evaluator, EvaluatorSettings};
use tournament_eval::services::judge::JudgeServiceClient;
use tournament_eval::services::queue::{JobQueue, QueueSettings};

pub fn prompt(id: i64, suite_id: i64) -> PromptRecord {
    PromptRecord {
        id,
        suite_id,
        text: format!("Prompt {} text", id),
        solution: format!("Solution {}", id),
        prompt_type: "reasoning".to_string(),
    }
}

/// Register models and prompts in a suite. Every pair gets a response when
/// `with_responses` is set.
pub fn seed_suite(store: &MemoryStore, suite_id: i64, models: &[i64], prompts: &[i64], with_responses: bool) {
    for &model_id in models {
        store.add_model(model_id, suite_id);
    }
    for &prompt_id in prompts {
        store.add_prompt(prompt(prompt_id, suite_id));
    }
    if with_responses {
        for &model_id in models {
            for &prompt_id in prompts {
                store.add_response(model_id, prompt_id, format!("model {} answers {}", model_id, prompt_id));
            }
        }
    }
}

pub fn queue_settings(worker_count: usize) -> QueueSettings {
    QueueSettings {
        worker_count,
        capacity: 100,
        resume_delay: Duration::ZERO,
    }
}

pub fn evaluator_settings() -> EvaluatorSettings {
    EvaluatorSettings {
        judges: vec!["judge-a".to_string(), "judge-b".to_string()],
        api_key_providers: vec!["anthropic".to_string(), "openai".to_string()],
        cost_per_unit: 0.05,
    }
}

/// Body of a successful `/evaluate` call with the given `(judge, score, confidence)` opinions.
pub fn evaluate_body(opinions: &[(&str, f64, f64)], total_cost: f64) -> serde_json::Value {
    let results: Vec<_> = opinions
        .iter()
        .map(|(judge, score, confidence)| {
            json!({
                "judge": judge,
                "score": score,
                "confidence": confidence,
                "reasoning": format!("{} reasoning", judge),
                "cost_usd": total_cost / opinions.len() as f64,
            })
        })
        .collect();

    json!({
        "results": results,
        "total_cost_usd": total_cost,
        "consensus_score": 0,
        "avg_confidence": 0,
    })
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<JobQueue>,
    pub evaluator: Arc<Evaluator>,
    pub server: MockServer,
}

/// Memory store + queue + evaluator wired against a mock judge service.
/// Workers are not started.
pub async fn harness(worker_count: usize) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();

    let judge = Arc::new(
        JudgeServiceClient::new(&server.uri(), Duration::from_secs(5)).expect("failed to build judge client"),
    );
    let queue = Arc::new(JobQueue::new(dyn_store.clone(), queue_settings(worker_count)));
    let evaluator = Arc::new(Evaluator::new(dyn_store, queue.clone(), judge, evaluator_settings()));

    Harness {
        store,
        queue,
        evaluator,
        server,
    }
}

/// Poll a job until `done` holds, failing the test after five seconds.
pub async fn wait_for_job<F>(store: &dyn Store, job_id: Uuid, done: F) -> EvaluationJob
where
    F: Fn(&EvaluationJob) -> bool,
{
    let poll = async {
        loop {
            let job = store.get_job(job_id).await.expect("job should exist");
            if done(&job) {
                return job;
            }
            sleep(Duration::from_millis(10)).await;
        }
    };

    timeout(Duration::from_secs(5), poll)
        .await
        .unwrap_or_else(|_| panic!("job {} did not reach the expected state", job_id))
}

pub async fn wait_for_terminal(store: &dyn Store, job_id: Uuid) -> EvaluationJob {
    wait_for_job(store, job_id, |j| j.status.is_terminal()).await
}

/// Wait until the queue no longer lists the job as running.
pub async fn wait_until_released(queue: &JobQueue, job_id: Uuid) {
    let poll = async {
        while queue.is_running(job_id).await {
            sleep(Duration::from_millis(10)).await;
        }
    };

    timeout(Duration::from_secs(5), poll)
        .await
        .unwrap_or_else(|_| panic!("job {} was never released", job_id));
}

pub fn assert_status(job: &EvaluationJob, status: JobStatus) {
    assert_eq!(job.status, status, "unexpected status for job {}: {:?}", job.id, job);
}
