//! Evaluator tests: submission, per-pair scoring, and job drivers against a
//! mocked judge service.

mod helpers;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use helpers::*;
use tournament_eval::db::Store;
use tournament_eval::models::job::{EvaluationJob, JobStatus, NewEvaluationJob};
use tournament_eval::services::evaluator::EvaluatorError;
use tournament_eval::services::queue::CancelSignal;

async fn mount_evaluate(h: &Harness, body: serde_json::Value, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(&h.server)
        .await;
}

async fn stored_job(h: &Harness, job_id: Uuid) -> EvaluationJob {
    h.store.get_job(job_id).await.expect("job should exist")
}

#[tokio::test]
async fn test_evaluate_all_sizes_the_job() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10, 11], &[100, 101, 102], true);

    let job_id = h.evaluator.evaluate_all(1).await.unwrap();
    let job = stored_job(&h, job_id).await;

    assert_eq!(job.job_type, "all");
    assert_eq!(job.suite_id, 1);
    assert_eq!(job.target_id, None);
    assert_eq!(job.progress_total, 6);
    assert!((job.estimated_cost - 0.30).abs() < 1e-9);
    assert_status(&job, JobStatus::Pending);
}

#[tokio::test]
async fn test_evaluate_model_and_prompt_resolve_suite() {
    let h = harness(1).await;
    seed_suite(&h.store, 4, &[10, 11, 12], &[100, 101], true);

    let model_job = stored_job(&h, h.evaluator.evaluate_model(11).await.unwrap()).await;
    assert_eq!(model_job.job_type, "model");
    assert_eq!(model_job.suite_id, 4);
    assert_eq!(model_job.target_id, Some(11));
    assert_eq!(model_job.progress_total, 2);

    let prompt_job = stored_job(&h, h.evaluator.evaluate_prompt(101).await.unwrap()).await;
    assert_eq!(prompt_job.job_type, "prompt");
    assert_eq!(prompt_job.target_id, Some(101));
    assert_eq!(prompt_job.progress_total, 3);
    assert!((prompt_job.estimated_cost - 0.15).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_target_creates_no_job() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);

    let err = h.evaluator.evaluate_model(999).await.unwrap_err();
    assert!(matches!(err, EvaluatorError::Store(ref e) if e.is_not_found()));

    let err = h.evaluator.evaluate_prompt(999).await.unwrap_err();
    assert!(matches!(err, EvaluatorError::Store(ref e) if e.is_not_found()));

    assert!(h.store.jobs().is_empty());
}

#[tokio::test]
async fn test_pair_scores_consensus_and_records_history() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);
    mount_evaluate(
        &h,
        evaluate_body(&[("judge-a", 80.0, 0.9), ("judge-b", 60.0, 0.7)], 0.02),
        1,
    )
    .await;

    let job_id = Uuid::new_v4();
    let cost = h
        .evaluator
        .evaluate_model_prompt_pair(job_id, 10, 100)
        .await
        .unwrap();

    // round(71.25) = 71, snapped to 80
    assert_eq!(h.store.score(10, 100), Some(80));
    assert!((cost - 0.02).abs() < 1e-9);

    let history = h.store.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|row| row.entry.job_id == job_id));
    assert_eq!(history[0].entry.judge_name, "judge-a");
    assert_eq!(history[0].entry.judge_score, 80.0);
    assert_eq!(history[1].entry.judge_confidence, 0.7);
}

#[tokio::test]
async fn test_pair_scores_around_a_judge_that_returned_nulls() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);
    mount_evaluate(
        &h,
        json!({
            "results": [
                {"judge": "judge-a", "score": 80, "confidence": 0.9, "reasoning": "close", "cost_usd": 0.01},
                {"judge": "judge-b", "score": null, "confidence": null, "error": "rate limited"}
            ],
            "total_cost_usd": 0.01,
            "consensus_score": 80,
            "avg_confidence": 0.9
        }),
        1,
    )
    .await;

    let cost = h
        .evaluator
        .evaluate_model_prompt_pair(Uuid::new_v4(), 10, 100)
        .await
        .expect("one failed judge should not sink the pair");

    assert_eq!(h.store.score(10, 100), Some(80));
    assert!((cost - 0.01).abs() < 1e-9);
}

#[tokio::test]
async fn test_pair_without_response_is_skipped() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], false);
    mount_evaluate(&h, evaluate_body(&[("judge-a", 80.0, 1.0)], 0.01), 0).await;

    let cost = h
        .evaluator
        .evaluate_model_prompt_pair(Uuid::new_v4(), 10, 100)
        .await
        .unwrap();

    assert_eq!(cost, 0.0);
    assert_eq!(h.store.score(10, 100), None);
}

#[tokio::test]
async fn test_pair_with_missing_prompt_errors() {
    let h = harness(1).await;

    let err = h
        .evaluator
        .evaluate_model_prompt_pair(Uuid::new_v4(), 10, 404)
        .await
        .unwrap_err();

    assert!(matches!(err, EvaluatorError::PromptNotFound(404)));
}

#[tokio::test]
async fn test_pair_surfaces_judge_failure() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);
    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream timeout"))
        .mount(&h.server)
        .await;

    let err = h
        .evaluator
        .evaluate_model_prompt_pair(Uuid::new_v4(), 10, 100)
        .await
        .unwrap_err();

    assert!(matches!(err, EvaluatorError::Judge(_)));
    assert!(err.to_string().contains("upstream timeout"));
    assert_eq!(h.store.score(10, 100), None);
}

#[tokio::test]
async fn test_history_failure_keeps_score() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);
    h.store.fail_history_writes(true);
    mount_evaluate(&h, evaluate_body(&[("judge-a", 40.0, 0.8)], 0.01), 1).await;

    let cost = h
        .evaluator
        .evaluate_model_prompt_pair(Uuid::new_v4(), 10, 100)
        .await
        .unwrap();

    assert_eq!(h.store.score(10, 100), Some(40));
    assert!(h.store.history().is_empty());
    assert!((cost - 0.01).abs() < 1e-9);
}

#[tokio::test]
async fn test_api_keys_are_forwarded_with_blanks_for_missing() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);
    h.store.set_setting("api_key_openai", "sk-test");
    h.store.set_setting("api_key_unused", "ignored");

    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .and(body_partial_json(json!({
            "prompt": "Prompt 100 text",
            "solution": "Solution 100",
            "type": "reasoning",
            "judges": ["judge-a", "judge-b"],
            "api_keys": {"openai": "sk-test", "anthropic": ""}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(evaluate_body(&[("judge-a", 100.0, 1.0)], 0.01)))
        .expect(1)
        .mount(&h.server)
        .await;

    h.evaluator
        .evaluate_model_prompt_pair(Uuid::new_v4(), 10, 100)
        .await
        .unwrap();

    assert_eq!(h.store.score(10, 100), Some(100));
}

#[tokio::test]
async fn test_model_job_tracks_progress_and_cost() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100, 101, 102], true);
    mount_evaluate(&h, evaluate_body(&[("judge-a", 55.0, 0.5)], 0.03), 3).await;

    let job_id = h.evaluator.evaluate_model(10).await.unwrap();
    let job = stored_job(&h, job_id).await;
    let (_tx, mut cancel) = CancelSignal::channel();

    h.evaluator.process_job(&job, &mut cancel).await.unwrap();

    for prompt_id in [100, 101, 102] {
        assert_eq!(h.store.score(10, prompt_id), Some(60));
    }
    let job = stored_job(&h, job_id).await;
    assert_eq!(job.progress_current, 3);
    assert_eq!(job.progress_total, 3);
    assert!((job.actual_cost - 0.09).abs() < 1e-9);
}

#[tokio::test]
async fn test_all_job_skips_missing_responses_without_failing() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10, 11], &[100, 101], false);
    h.store.add_response(10, 100, "only answer");
    mount_evaluate(&h, evaluate_body(&[("judge-a", 20.0, 1.0)], 0.04), 1).await;

    let job_id = h.evaluator.evaluate_all(1).await.unwrap();
    let job = stored_job(&h, job_id).await;
    let (_tx, mut cancel) = CancelSignal::channel();

    h.evaluator.process_job(&job, &mut cancel).await.unwrap();

    assert_eq!(h.store.score_count(), 1);
    assert_eq!(h.store.score(10, 100), Some(20));
    let job = stored_job(&h, job_id).await;
    assert_eq!(job.progress_current, 4);
    assert!((job.actual_cost - 0.04).abs() < 1e-9);
}

#[tokio::test]
async fn test_pair_failures_do_not_abort_the_batch() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10, 11, 12], &[100], true);
    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&h.server)
        .await;

    let job_id = h.evaluator.evaluate_prompt(100).await.unwrap();
    let job = stored_job(&h, job_id).await;
    let (_tx, mut cancel) = CancelSignal::channel();

    h.evaluator.process_job(&job, &mut cancel).await.unwrap();

    assert_eq!(h.store.score_count(), 0);
    let job = stored_job(&h, job_id).await;
    assert_eq!(job.progress_current, 3);
    assert_eq!(job.actual_cost, 0.0);
}

#[tokio::test]
async fn test_pre_signalled_cancel_stops_before_any_unit() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10, 11], &[100, 101], true);
    mount_evaluate(&h, evaluate_body(&[("judge-a", 80.0, 1.0)], 0.01), 0).await;

    let job_id = h.evaluator.evaluate_all(1).await.unwrap();
    let job = stored_job(&h, job_id).await;
    let (tx, mut cancel) = CancelSignal::channel();
    tx.try_send(()).unwrap();

    let err = h.evaluator.process_job(&job, &mut cancel).await.unwrap_err();

    assert!(matches!(err, EvaluatorError::Cancelled));
    assert_eq!(err.to_string(), "job cancelled");
    assert_eq!(stored_job(&h, job_id).await.progress_current, 0);
    assert_eq!(h.store.score_count(), 0);
}

#[tokio::test]
async fn test_targeted_job_without_target_fails() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);

    let job_id = h
        .queue
        .enqueue(NewEvaluationJob {
            suite_id: 1,
            job_type: "model".to_string(),
            target_id: None,
            progress_total: 1,
            estimated_cost: 0.05,
        })
        .await
        .unwrap();
    let job = stored_job(&h, job_id).await;
    let (_tx, mut cancel) = CancelSignal::channel();

    let err = h.evaluator.process_job(&job, &mut cancel).await.unwrap_err();
    assert!(matches!(err, EvaluatorError::MissingTarget(id) if id == job_id));
}

#[tokio::test]
async fn test_unknown_job_type_fails_through_queue() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10], &[100], true);
    mount_evaluate(&h, evaluate_body(&[("judge-a", 80.0, 1.0)], 0.01), 0).await;
    h.queue.start(h.evaluator.clone());

    let job_id = h
        .queue
        .enqueue(NewEvaluationJob {
            suite_id: 1,
            job_type: "leaderboard".to_string(),
            target_id: None,
            progress_total: 1,
            estimated_cost: 0.05,
        })
        .await
        .unwrap();

    let job = wait_for_terminal(h.store.as_ref(), job_id).await;
    assert_status(&job, JobStatus::Failed);
    let message = job.error_message.expect("failed job should carry a message");
    assert!(message.contains("unsupported job type: leaderboard"), "{}", message);
    assert!(!h.queue.is_running(job_id).await);
}

#[tokio::test]
async fn test_full_run_through_workers() {
    let h = harness(2).await;
    seed_suite(&h.store, 3, &[10, 11], &[100, 101], true);
    mount_evaluate(
        &h,
        evaluate_body(&[("judge-a", 90.0, 0.9), ("judge-b", 95.0, 0.6), ("judge-c", 10.0, 0.0)], 0.05),
        4,
    )
    .await;
    h.queue.start(h.evaluator.clone());

    let job_id = h.evaluator.evaluate_all(3).await.unwrap();
    let job = wait_for_terminal(h.store.as_ref(), job_id).await;

    assert_status(&job, JobStatus::Completed);
    assert_eq!(job.progress_current, 4);
    assert!((job.actual_cost - 0.20).abs() < 1e-9);
    for model_id in [10, 11] {
        for prompt_id in [100, 101] {
            assert_eq!(h.store.score(model_id, prompt_id), Some(100));
        }
    }
    // Zero-confidence opinions are still audited.
    assert_eq!(h.store.history().len(), 12);

    let status = h.evaluator.get_job_status(job_id).await.unwrap();
    assert_eq!(status.id, job_id);
    assert!(h.evaluator.cancel_job(job_id).await.is_err());
}

#[tokio::test]
async fn test_estimate_pair_cost() {
    let h = harness(1).await;
    seed_suite(&h.store, 1, &[10, 11], &[100], false);
    h.store.add_response(10, 100, "answer");
    Mock::given(method("POST"))
        .and(path("/estimate_cost"))
        .and(body_partial_json(json!({"judges": ["judge-a", "judge-b"], "type": "reasoning"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "estimated_cost_usd": 0.012,
            "breakdown": {"judge-a": 0.01, "judge-b": 0.002}
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let estimate = h
        .evaluator
        .estimate_pair_cost(10, 100)
        .await
        .unwrap()
        .expect("pair with a response should be estimated");
    assert!((estimate.estimated_cost - 0.012).abs() < 1e-9);
    assert_eq!(estimate.breakdown.len(), 2);

    assert!(h.evaluator.estimate_pair_cost(11, 100).await.unwrap().is_none());
}
