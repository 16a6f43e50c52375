use std::sync::Arc;
use axum::{
    extract::{Extension, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{PaymentError, PaymentHistoryQuery, RecoveryAction};
use crate::services::{CoverageService, PaymentHistoryService, RecoveryService, SyncService};

const MAX_RECOVERY_WINDOW_HOURS: i64 = 24 * 30;

fn map_payment_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::NotFound(order_code) => {
            AppError::NotFound(format!("No payment for order code {}", order_code))
        }
        PaymentError::GatewayNotConfigured | PaymentError::Gateway(_) => {
            AppError::ExternalService(e.to_string())
        }
        PaymentError::BillingService(_) => AppError::ExternalService(e.to_string()),
        PaymentError::Database(_) => AppError::Database(e.to_string()),
        PaymentError::Validation(msg) => AppError::BadRequest(msg),
    }
}

#[axum::debug_handler]
pub async fn run_sync_job(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let service = SyncService::new(&config).map_err(map_payment_error)?;

    let report = service.run().await.map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": report
    })))
}

#[derive(Debug, Deserialize)]
pub struct RecoveryParams {
    pub action: RecoveryAction,
    pub hours: Option<i64>,
}

#[axum::debug_handler]
pub async fn run_recovery(
    State(config): State<Arc<AppConfig>>,
    Query(params): Query<RecoveryParams>,
) -> Result<Json<Value>, AppError> {
    let hours = params.hours.unwrap_or(24);
    if hours < 1 || hours > MAX_RECOVERY_WINDOW_HOURS {
        return Err(AppError::BadRequest(format!(
            "hours must be between 1 and {}",
            MAX_RECOVERY_WINDOW_HOURS
        )));
    }

    let service = RecoveryService::new(&config).map_err(map_payment_error)?;

    let report = service
        .run(hours, params.action)
        .await
        .map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": report
    })))
}

#[axum::debug_handler]
pub async fn payment_history(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PaymentHistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let service = PaymentHistoryService::new(&config);

    let page = service
        .get_history(&user, &query, auth.token())
        .await
        .map_err(map_payment_error)?;

    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn coverage_report(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let service = CoverageService::new(&config);

    let report = service.coverage().await.map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": report
    })))
}

#[axum::debug_handler]
pub async fn run_backfill(
    State(config): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let service = CoverageService::new(&config);

    let report = service.run_backfill().await.map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "data": report
    })))
}
