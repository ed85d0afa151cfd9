use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::store::{Store, StoreError};
use crate::models::job::{EvaluationJob, JobStatus, NewEvaluationJob};

pub const DEFAULT_WORKER_COUNT: usize = 3;
pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_RESUME_DELAY: Duration = Duration::from_secs(2);

/// Sizing of the worker pool.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub worker_count: usize,
    /// Jobs buffered before `enqueue` starts waiting for a free slot.
    pub capacity: usize,
    /// Pause before unfinished jobs from a previous run are re-admitted.
    pub resume_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            capacity: DEFAULT_CAPACITY,
            resume_delay: DEFAULT_RESUME_DELAY,
        }
    }
}

/// Receiving side of a job's cancellation channel.
///
/// Cancellation is advisory: processors poll [`is_cancelled`](Self::is_cancelled)
/// between units of work. Once observed, the signal stays set.
pub struct CancelSignal {
    rx: mpsc::Receiver<()>,
    cancelled: bool,
}

impl CancelSignal {
    pub fn channel() -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(1);
        (
            tx,
            Self {
                rx,
                cancelled: false,
            },
        )
    }

    /// Non-blocking check.
    pub fn is_cancelled(&mut self) -> bool {
        if !self.cancelled {
            self.cancelled = self.rx.try_recv().is_ok();
        }
        self.cancelled
    }
}

/// How a processor reports an unsuccessful job back to the queue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessError {
    #[error("job cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Executes one job on a worker. Implemented by the evaluator.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &EvaluationJob, cancel: &mut CancelSignal) -> Result<(), ProcessError>;
}

struct RunningJob {
    cancel_tx: mpsc::Sender<()>,
    cancel_requested: bool,
}

/// Bounded in-process job queue with persisted job lifecycle.
///
/// Only the worker that owns a job writes its status after submission, except
/// for [`cancel_job`](Self::cancel_job) which marks a running job cancelled.
pub struct JobQueue {
    store: Arc<dyn Store>,
    settings: QueueSettings,
    sender: mpsc::Sender<EvaluationJob>,
    receiver: Arc<Mutex<mpsc::Receiver<EvaluationJob>>>,
    running: Mutex<HashMap<Uuid, RunningJob>>,
    booted_at: DateTime<Utc>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>, settings: QueueSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));

        Self {
            store,
            settings,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            running: Mutex::new(HashMap::new()),
            booted_at: Utc::now(),
        }
    }

    /// Spawn the workers and schedule re-admission of unfinished jobs.
    pub fn start(self: &Arc<Self>, processor: Arc<dyn JobProcessor>) -> Vec<JoinHandle<()>> {
        let worker_count = self.settings.worker_count.max(1);
        info!(worker_count, capacity = self.settings.capacity, "Starting job queue workers");

        let mut handles: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|worker_id| {
                let queue = Arc::clone(self);
                let processor = Arc::clone(&processor);
                tokio::spawn(async move { queue.worker(worker_id, processor).await })
            })
            .collect();

        let queue = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(queue.settings.resume_delay).await;
            if let Err(e) = queue.resume_pending_jobs().await {
                error!(error = %e, "Failed to resume unfinished jobs");
            }
        }));

        handles
    }

    /// Persist a new job as `pending` and push it onto the queue.
    ///
    /// Waits for a free slot when the queue is full. The row is written first, so
    /// a caller dropped while waiting leaves a `pending` job that is only picked
    /// up by the next restart's resume.
    pub async fn enqueue(&self, job: NewEvaluationJob) -> Result<Uuid, QueueError> {
        let row = self.store.insert_job(&job).await?;
        let job_id = row.id;

        metrics::counter!("evaluation_jobs_submitted_total", "job_type" => row.job_type.clone())
            .increment(1);

        self.sender.send(row).await.map_err(|_| QueueError::Closed)?;
        metrics::gauge!("evaluation_queue_depth").set(self.queue_depth() as f64);

        info!(job_id = %job_id, job_type = %job.job_type, units = job.progress_total, "Job enqueued");
        Ok(job_id)
    }

    /// Signal a running job to stop and mark it cancelled.
    ///
    /// Jobs that are not currently running cannot be cancelled.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), QueueError> {
        let cancel_tx = {
            let mut running = self.running.lock().await;
            let entry = running.get_mut(&job_id).ok_or(QueueError::NotRunning(job_id))?;
            entry.cancel_requested = true;
            entry.cancel_tx.clone()
        };

        // A full channel means the signal is already pending.
        let _ = cancel_tx.try_send(());

        self.store.set_job_status(job_id, JobStatus::Cancelled).await?;
        info!(job_id = %job_id, "Job cancellation requested");
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<EvaluationJob, QueueError> {
        Ok(self.store.get_job(job_id).await?)
    }

    pub async fn update_job_progress(
        &self,
        job_id: Uuid,
        current: i64,
        total: i64,
        actual_cost: f64,
    ) -> Result<(), QueueError> {
        self.store
            .update_job_progress(job_id, current, total, actual_cost)
            .await?;
        Ok(())
    }

    /// Re-admit jobs a previous process left `pending` or `running`.
    ///
    /// Only jobs created before this queue was constructed are considered; later
    /// ones were enqueued here and are already in the channel. Jobs restart from
    /// their first unit, so already scored pairs are judged again.
    pub async fn resume_pending_jobs(&self) -> Result<usize, QueueError> {
        let jobs: Vec<EvaluationJob> = self
            .store
            .list_unfinished_jobs()
            .await?
            .into_iter()
            .filter(|job| job.created_at < self.booted_at)
            .collect();
        let count = jobs.len();

        for mut job in jobs {
            self.store.set_job_status(job.id, JobStatus::Pending).await?;
            job.status = JobStatus::Pending;

            info!(job_id = %job.id, job_type = %job.job_type, "Resuming unfinished job");
            self.sender.send(job).await.map_err(|_| QueueError::Closed)?;
        }

        if count > 0 {
            info!(count, "Re-admitted unfinished jobs");
        }
        Ok(count)
    }

    /// Jobs waiting in the channel.
    pub fn queue_depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub async fn running_job_ids(&self) -> Vec<Uuid> {
        self.running.lock().await.keys().copied().collect()
    }

    pub async fn is_running(&self, job_id: Uuid) -> bool {
        self.running.lock().await.contains_key(&job_id)
    }

    async fn worker(self: Arc<Self>, worker_id: usize, processor: Arc<dyn JobProcessor>) {
        debug!(worker_id, "Worker started");

        loop {
            let next = {
                let mut receiver = self.receiver.lock().await;
                receiver.recv().await
            };

            match next {
                Some(job) => self.run_job(worker_id, processor.as_ref(), job).await,
                None => break,
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    async fn run_job(&self, worker_id: usize, processor: &dyn JobProcessor, mut job: EvaluationJob) {
        let job_id = job.id;
        let (cancel_tx, mut cancel) = CancelSignal::channel();

        {
            let mut running = self.running.lock().await;
            running.insert(
                job_id,
                RunningJob {
                    cancel_tx,
                    cancel_requested: false,
                },
            );
            metrics::gauge!("evaluation_running_jobs").set(running.len() as f64);
        }
        metrics::gauge!("evaluation_queue_depth").set(self.queue_depth() as f64);

        let started_at = Utc::now();
        if let Err(e) = self.store.mark_job_running(job_id, started_at).await {
            // Left pending in storage; picked up again on the next restart.
            error!(job_id = %job_id, worker_id, error = %e, "Failed to mark job running");
            self.deregister(job_id).await;
            return;
        }
        job.status = JobStatus::Running;
        job.started_at = Some(started_at);

        info!(job_id = %job_id, worker_id, job_type = %job.job_type, "Processing evaluation job");
        let outcome = processor.process(&job, &mut cancel).await;

        let cancel_requested = self.deregister(job_id).await;

        let (status, error_message) = match (outcome, cancel_requested) {
            (_, true) | (Err(ProcessError::Cancelled), _) => (JobStatus::Cancelled, None),
            (Ok(()), false) => (JobStatus::Completed, None),
            (Err(ProcessError::Failed(message)), false) => (JobStatus::Failed, Some(message)),
        };

        if let Err(e) = self
            .store
            .finish_job(job_id, status, error_message.as_deref(), Utc::now())
            .await
        {
            error!(job_id = %job_id, worker_id, error = %e, "Failed to persist job outcome");
        }

        metrics::counter!("evaluation_jobs_finished_total", "status" => status.to_string()).increment(1);

        match status {
            JobStatus::Failed => warn!(
                job_id = %job_id,
                worker_id,
                error = error_message.as_deref().unwrap_or_default(),
                "Job failed"
            ),
            _ => info!(job_id = %job_id, worker_id, status = %status, "Job finished"),
        }
    }

    /// Drop a job from the running set, returning whether cancellation was requested.
    async fn deregister(&self, job_id: Uuid) -> bool {
        let mut running = self.running.lock().await;
        let entry = running.remove(&job_id);
        metrics::gauge!("evaluation_running_jobs").set(running.len() as f64);
        entry.is_some_and(|e| e.cancel_requested)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Job queue is closed")]
    Closed,

    #[error("job {0} is not running")]
    NotRunning(Uuid),
}
