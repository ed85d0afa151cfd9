use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tournament_eval::{
    app_state::AppState,
    config::AppConfig,
    db::{self, PgStore, Store},
    routes,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    tracing::info!("Initializing tournament evaluation service");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "evaluation_jobs_submitted_total",
        "Evaluation jobs submitted, by job type"
    );
    metrics::describe_counter!(
        "evaluation_jobs_finished_total",
        "Evaluation jobs that reached a terminal status, by status"
    );
    metrics::describe_counter!(
        "evaluation_pairs_total",
        "Model/prompt pairs attempted, by outcome"
    );
    metrics::describe_histogram!(
        "evaluation_pair_seconds",
        "Judge service latency for one model/prompt pair"
    );
    metrics::describe_gauge!("evaluation_running_jobs", "Jobs currently held by a worker");
    metrics::describe_gauge!("evaluation_queue_depth", "Jobs waiting for a worker");

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool));

    tracing::info!(judge_service_url = %config.judge_service_url, "Initializing judge service client");
    let state = AppState::new(store, &config).expect("Failed to initialize judge service client");

    match state.judge.health_check().await {
        Ok(()) => tracing::info!("Judge service is healthy"),
        Err(e) => tracing::warn!(error = %e, "Judge service health check failed, continuing"),
    }

    let _workers = state.start_workers();

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/suites/{suite_id}/evaluate",
            post(routes::evaluations::evaluate_suite),
        )
        .route(
            "/api/v1/models/{model_id}/evaluate",
            post(routes::evaluations::evaluate_model),
        )
        .route(
            "/api/v1/prompts/{prompt_id}/evaluate",
            post(routes::evaluations::evaluate_prompt),
        )
        .route("/api/v1/estimate", post(routes::evaluations::estimate_pair))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job_status))
        .route("/api/v1/jobs/{job_id}/cancel", post(routes::jobs::cancel_job))
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
