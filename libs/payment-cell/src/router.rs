use std::sync::Arc;
use axum::{middleware, routing::{get, post}, Router};
use shared_config::AppConfig;
use shared_utils::extractor::{auth_middleware, job_secret_middleware};

use crate::handlers::*;

pub fn create_payment_router(config: Arc<AppConfig>) -> Router {
    // Job endpoints are called by operators and the scheduler, guarded by the
    // shared sync secret rather than a user JWT
    let jobs = Router::new()
        .route("/sync-job", post(run_sync_job))
        .route("/recovery", get(run_recovery))
        .route("/coverage", get(coverage_report))
        .route("/backfill", post(run_backfill))
        .layer(middleware::from_fn_with_state(config.clone(), job_secret_middleware))
        .with_state(config.clone());

    let history = Router::new()
        .route("/history", get(payment_history))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config);

    jobs.merge(history)
}
