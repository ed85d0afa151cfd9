use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::store::StoreError;
use crate::models::job::{EvaluationJob, JobStatus, NewEvaluationJob};

const JOB_COLUMNS: &str = r#"
    id, suite_id, job_type, target_id, status, progress_current, progress_total,
    estimated_cost_usd, actual_cost_usd, error_message, created_at, started_at, completed_at
"#;

fn job_from_row(row: &PgRow) -> Result<EvaluationJob, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|_| StoreError::Decode(format!("unknown job status '{}'", status_str)))?;

    Ok(EvaluationJob {
        id: row.try_get("id")?,
        suite_id: row.try_get("suite_id")?,
        job_type: row.try_get("job_type")?,
        target_id: row.try_get("target_id")?,
        status,
        progress_current: row.try_get("progress_current")?,
        progress_total: row.try_get("progress_total")?,
        estimated_cost: row.try_get("estimated_cost_usd")?,
        actual_cost: row.try_get("actual_cost_usd")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Insert a new evaluation job in `pending` state.
///
/// `created_at` comes from the application clock so it can be compared with the
/// queue's boot time on resumption.
pub async fn create_job(pool: &PgPool, job: &NewEvaluationJob) -> Result<EvaluationJob, StoreError> {
    let sql = format!(
        r#"
        INSERT INTO evaluation_jobs
            (suite_id, job_type, target_id, status, progress_current, progress_total,
             estimated_cost_usd, actual_cost_usd, created_at)
        VALUES ($1, $2, $3, 'pending', 0, $4, $5, 0, $6)
        RETURNING {JOB_COLUMNS}
        "#
    );

    let row = sqlx::query(&sql)
        .bind(job.suite_id)
        .bind(&job.job_type)
        .bind(job.target_id)
        .bind(job.progress_total)
        .bind(job.estimated_cost)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<EvaluationJob>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM evaluation_jobs WHERE id = $1");

    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Update job status without touching timestamps.
pub async fn update_job_status(pool: &PgPool, job_id: Uuid, status: JobStatus) -> Result<(), StoreError> {
    sqlx::query("UPDATE evaluation_jobs SET status = $1 WHERE id = $2")
        .bind(status.as_ref())
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn mark_job_running(
    pool: &PgPool,
    job_id: Uuid,
    started_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE evaluation_jobs
        SET status = 'running',
            started_at = $1
        WHERE id = $2
        "#,
    )
    .bind(started_at)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a terminal status. `error_message` is only written for failures.
pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    status: JobStatus,
    error_message: Option<&str>,
    completed_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE evaluation_jobs
        SET status = $1,
            error_message = COALESCE($2, error_message),
            completed_at = $3
        WHERE id = $4
        "#,
    )
    .bind(status.as_ref())
    .bind(error_message)
    .bind(completed_at)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_job_progress(
    pool: &PgPool,
    job_id: Uuid,
    current: i64,
    total: i64,
    actual_cost: f64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE evaluation_jobs
        SET progress_current = $1,
            progress_total = $2,
            actual_cost_usd = $3
        WHERE id = $4
        "#,
    )
    .bind(current)
    .bind(total)
    .bind(actual_cost)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get jobs that never reached a terminal state (for resumption after restart)
pub async fn get_unfinished_jobs(pool: &PgPool) -> Result<Vec<EvaluationJob>, StoreError> {
    let sql = format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM evaluation_jobs
        WHERE status IN ('pending', 'running')
        ORDER BY created_at ASC
        "#
    );

    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter().map(job_from_row).collect()
}
