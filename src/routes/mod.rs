use axum::http::StatusCode;

use crate::services::evaluator::EvaluatorError;
use crate::services::queue::QueueError;

pub mod evaluations;
pub mod health;
pub mod jobs;
pub mod metrics;

/// Map a core error onto the HTTP status the handlers report.
pub(crate) fn error_status(err: &EvaluatorError) -> StatusCode {
    match err {
        EvaluatorError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
        EvaluatorError::Queue(QueueError::Store(e)) if e.is_not_found() => StatusCode::NOT_FOUND,
        EvaluatorError::PromptNotFound(_) => StatusCode::NOT_FOUND,
        EvaluatorError::Queue(QueueError::NotRunning(_)) => StatusCode::CONFLICT,
        EvaluatorError::Queue(QueueError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
        EvaluatorError::Judge(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
