use std::collections::HashMap;

use sqlx::{PgPool, Row};

use crate::models::evaluation::{NewEvaluationHistory, PromptRecord};

/// Suite a model belongs to, if the model exists.
pub async fn suite_for_model(pool: &PgPool, model_id: i64) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT suite_id FROM models WHERE id = $1")
        .bind(model_id)
        .fetch_optional(pool)
        .await
}

/// Suite a prompt belongs to, if the prompt exists.
pub async fn suite_for_prompt(pool: &PgPool, prompt_id: i64) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT suite_id FROM prompts WHERE id = $1")
        .bind(prompt_id)
        .fetch_optional(pool)
        .await
}

pub async fn count_models(pool: &PgPool, suite_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM models WHERE suite_id = $1")
        .bind(suite_id)
        .fetch_one(pool)
        .await
}

pub async fn count_prompts(pool: &PgPool, suite_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM prompts WHERE suite_id = $1")
        .bind(suite_id)
        .fetch_one(pool)
        .await
}

pub async fn list_model_ids(pool: &PgPool, suite_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM models WHERE suite_id = $1 ORDER BY id")
        .bind(suite_id)
        .fetch_all(pool)
        .await
}

pub async fn list_prompt_ids(pool: &PgPool, suite_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM prompts WHERE suite_id = $1 ORDER BY id")
        .bind(suite_id)
        .fetch_all(pool)
        .await
}

pub async fn get_prompt(pool: &PgPool, prompt_id: i64) -> Result<Option<PromptRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, suite_id, text, COALESCE(solution, '') AS solution, COALESCE(type, '') AS type
        FROM prompts
        WHERE id = $1
        "#,
    )
    .bind(prompt_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| -> Result<PromptRecord, sqlx::Error> {
        Ok(PromptRecord {
            id: r.try_get("id")?,
            suite_id: r.try_get("suite_id")?,
            text: r.try_get("text")?,
            solution: r.try_get("solution")?,
            prompt_type: r.try_get("type")?,
        })
    })
    .transpose()
}

pub async fn get_model_response(
    pool: &PgPool,
    model_id: i64,
    prompt_id: i64,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT response_text FROM model_responses WHERE model_id = $1 AND prompt_id = $2",
    )
    .bind(model_id)
    .bind(prompt_id)
    .fetch_optional(pool)
    .await
}

pub async fn settings_with_prefix(
    pool: &PgPool,
    prefix: &str,
) -> Result<HashMap<String, String>, sqlx::Error> {
    let rows = sqlx::query("SELECT key, value FROM settings WHERE starts_with(key, $1)")
        .bind(prefix)
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|r| -> Result<(String, String), sqlx::Error> {
            Ok((r.try_get("key")?, r.try_get("value")?))
        })
        .collect()
}

/// Insert or overwrite the score of a (model, prompt) pair.
pub async fn upsert_score(
    pool: &PgPool,
    model_id: i64,
    prompt_id: i64,
    score: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO scores (model_id, prompt_id, score)
        VALUES ($1, $2, $3)
        ON CONFLICT (model_id, prompt_id) DO UPDATE SET score = EXCLUDED.score
        "#,
    )
    .bind(model_id)
    .bind(prompt_id)
    .bind(score)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record one judge opinion for audit.
pub async fn insert_history(pool: &PgPool, entry: &NewEvaluationHistory) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO evaluation_history
            (job_id, model_id, prompt_id, judge_name, judge_score, judge_confidence,
             judge_reasoning, cost_usd)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(entry.job_id)
    .bind(entry.model_id)
    .bind(entry.prompt_id)
    .bind(&entry.judge_name)
    .bind(entry.judge_score)
    .bind(entry.judge_confidence)
    .bind(&entry.judge_reasoning)
    .bind(entry.cost)
    .execute(pool)
    .await?;

    Ok(())
}
