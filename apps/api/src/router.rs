use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use payment_cell::router::create_payment_router;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Payment reconciliation API is running!" }))
        .nest("/payments", create_payment_router(state))
}
