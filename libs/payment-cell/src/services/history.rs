use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::models::{
    PaymentError, PaymentHistoryPage, PaymentHistoryQuery, PaymentStatus, PaymentSummary,
};
use crate::services::store::{PaymentAggregateRow, PaymentStore};

const SOURCE_BILLING: &str = "billing-service";
const SOURCE_DATABASE: &str = "database";

/// The billing service exposes the same paginated history shape; when it is
/// configured we prefer it and fall back to the direct query on any failure.
struct BillingServiceClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl BillingServiceClient {
    fn new(config: &AppConfig) -> Option<Self> {
        if !config.is_billing_service_configured() {
            return None;
        }
        Some(Self {
            client: Client::new(),
            base_url: config.billing_service_url.clone(),
            request_timeout: Duration::from_secs(config.billing_service_timeout_seconds),
        })
    }

    async fn fetch_history(
        &self,
        patient_id: Option<Uuid>,
        query: &PaymentHistoryQuery,
        auth_token: &str,
    ) -> Result<PaymentHistoryPage, PaymentError> {
        let mut params = vec![
            format!("page={}", query.page()),
            format!("limit={}", query.limit()),
        ];
        if let Some(patient_id) = patient_id {
            params.push(format!("patient_id={}", patient_id));
        }
        if let Some(start) = query.start_date {
            params.push(format!("start_date={}", urlencoding::encode(&start.to_rfc3339())));
        }
        if let Some(end) = query.end_date {
            params.push(format!("end_date={}", urlencoding::encode(&end.to_rfc3339())));
        }
        if let Some(order_code) = query.order_code {
            params.push(format!("order_code={}", order_code));
        }
        if let Some(doctor_id) = query.doctor_id {
            params.push(format!("doctor_id={}", doctor_id));
        }

        let url = format!("{}/payments/history?{}", self.base_url, params.join("&"));
        debug!("Fetching history from billing service: {}", url);

        // A slow billing service must not block the page load
        let response = timeout(
            self.request_timeout,
            self.client
                .get(&url)
                .header("Authorization", format!("Bearer {}", auth_token))
                .send(),
        )
        .await
        .map_err(|_| PaymentError::BillingService("request timed out".to_string()))?
        .map_err(|e| PaymentError::BillingService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::BillingService(format!("HTTP {}", status)));
        }

        let mut page: PaymentHistoryPage = response
            .json()
            .await
            .map_err(|e| PaymentError::BillingService(e.to_string()))?;
        page.source = SOURCE_BILLING.to_string();
        Ok(page)
    }
}

/// Patient-scoped payment history. Patients only ever see records linked to
/// their own resolved patient id; admins see everything.
pub struct PaymentHistoryService {
    store: Arc<PaymentStore>,
    billing: Option<BillingServiceClient>,
}

impl PaymentHistoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PaymentStore::new(config)),
            billing: BillingServiceClient::new(config),
        }
    }

    pub fn with_store(store: Arc<PaymentStore>) -> Self {
        Self { store, billing: None }
    }

    #[instrument(skip(self, auth_token), fields(user_id = %user.id))]
    pub async fn get_history(
        &self,
        user: &User,
        query: &PaymentHistoryQuery,
        auth_token: &str,
    ) -> Result<PaymentHistoryPage, PaymentError> {
        let patient_id = if user.is_admin() {
            None
        } else {
            match self.store.resolve_patient_id(&user.id, auth_token).await? {
                Some(id) => Some(id),
                None => {
                    // No patient row yet: an empty page, not an error
                    debug!("No patient record for profile {}", user.id);
                    return Ok(PaymentHistoryPage::empty(query, SOURCE_DATABASE));
                }
            }
        };

        if let Some(billing) = &self.billing {
            match billing.fetch_history(patient_id, query, auth_token).await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!("Billing service unavailable, falling back to database: {}", e);
                }
            }
        }

        self.fetch_direct(patient_id, query, auth_token).await
    }

    async fn fetch_direct(
        &self,
        patient_id: Option<Uuid>,
        query: &PaymentHistoryQuery,
        auth_token: &str,
    ) -> Result<PaymentHistoryPage, PaymentError> {
        let payments = self.store.history_page(patient_id, query, auth_token).await?;
        let aggregates = self
            .store
            .history_aggregates(patient_id, query, auth_token)
            .await?;

        Ok(PaymentHistoryPage {
            payments,
            page: query.page(),
            limit: query.limit(),
            total: aggregates.len(),
            summary: summarize(&aggregates),
            source: SOURCE_DATABASE.to_string(),
        })
    }
}

fn summarize(rows: &[PaymentAggregateRow]) -> PaymentSummary {
    let total_transactions = rows.len();
    let completed: Vec<&PaymentAggregateRow> = rows
        .iter()
        .filter(|row| row.status == PaymentStatus::Completed)
        .collect();

    let total_paid: i64 = completed.iter().map(|row| row.amount).sum();
    let average_amount = if completed.is_empty() {
        0
    } else {
        total_paid / completed.len() as i64
    };
    let sync_rate = if total_transactions > 0 {
        rows.iter().filter(|row| row.transaction_id.is_some()).count() as f64
            / total_transactions as f64
    } else {
        0.0
    };

    PaymentSummary {
        total_paid,
        total_transactions,
        average_amount,
        sync_rate,
    }
}
