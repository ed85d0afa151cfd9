use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::store::Store;
use crate::services::{
    evaluator::Evaluator,
    judge::{JudgeError, JudgeServiceClient},
    queue::JobQueue,
};

/// Shared application state passed to all route handlers.
///
/// Built once at startup; the queue workers are started separately with
/// [`AppState::start_workers`].
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub judge: Arc<JudgeServiceClient>,
    pub queue: Arc<JobQueue>,
    pub evaluator: Arc<Evaluator>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Result<Self, JudgeError> {
        let judge = Arc::new(JudgeServiceClient::new(
            &config.judge_service_url,
            config.judge_timeout(),
        )?);
        let queue = Arc::new(JobQueue::new(Arc::clone(&store), config.queue_settings()));
        let evaluator = Arc::new(Evaluator::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&judge),
            config.evaluator_settings(),
        ));

        Ok(Self {
            store,
            judge,
            queue,
            evaluator,
        })
    }

    /// Spawn the evaluation workers and the delayed resumption of unfinished jobs.
    pub fn start_workers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.queue.start(self.evaluator.clone())
    }
}
