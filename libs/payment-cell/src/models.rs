use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local lifecycle of a payment attempt. Transitions are driven by the
/// gateway: the jobs only ever move records forward, never back out of
/// `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// A completed record is settled; the sync job must not touch it again.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }

    pub fn is_reconcilable(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payment attempt as stored in the `payments` table. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_code: i64,
    pub amount: i64,
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub transaction_id: Option<String>,
    pub payment_link_id: Option<String>,
    pub record_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Gateway wire types (PayOS v2 payment-requests API, camelCase on the wire)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayResponse<T> {
    pub code: String,
    pub desc: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPayment {
    /// Payment link identifier assigned by the gateway.
    pub id: String,
    pub order_code: i64,
    pub amount: i64,
    #[serde(default)]
    pub amount_paid: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub transactions: Vec<GatewayTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTransaction {
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub transaction_date_time: Option<DateTime<Utc>>,
}

impl GatewayPayment {
    /// Maps the gateway's authoritative status onto the local enum.
    /// Unrecognised statuses yield `None` and are skipped by the jobs.
    pub fn local_status(&self) -> Option<PaymentStatus> {
        match self.status.as_str() {
            "PAID" => Some(PaymentStatus::Completed),
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "CANCELLED" | "EXPIRED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn transaction_reference(&self) -> Option<&str> {
        self.transactions.first().map(|t| t.reference.as_str())
    }
}

// ---------------------------------------------------------------------------
// Job reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    Check,
    Recover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingPayment {
    pub order_code: i64,
    pub amount: i64,
    pub gateway_status: String,
    pub payment_link_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMismatch {
    pub order_code: i64,
    pub local_status: PaymentStatus,
    pub gateway_status: String,
}

/// A divergence the jobs refuse to repair automatically: the local record is
/// already settled and the gateway disagrees on amount, status, or both.
/// Left for manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConflict {
    pub order_code: i64,
    pub local_status: PaymentStatus,
    pub local_amount: i64,
    pub gateway_status: String,
    pub gateway_amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub payos_total: usize,
    pub database_total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub action: RecoveryAction,
    pub window_hours: i64,
    pub missing: Vec<MissingPayment>,
    pub status_mismatches: Vec<StatusMismatch>,
    pub conflicts: Vec<PaymentConflict>,
    pub summary: RecoverySummary,
    pub recovered: usize,
    pub updated: usize,
}

// ---------------------------------------------------------------------------
// History read path
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentHistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub order_code: Option<i64>,
    pub doctor_id: Option<Uuid>,
}

impl PaymentHistoryQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub total_paid: i64,
    pub total_transactions: usize,
    pub average_amount: i64,
    /// Fraction of records already confirmed by the gateway.
    pub sync_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHistoryPage {
    pub payments: Vec<PaymentRecord>,
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub summary: PaymentSummary,
    /// Which backend actually served the page: `billing-service` or `database`.
    pub source: String,
}

impl PaymentHistoryPage {
    pub fn empty(query: &PaymentHistoryQuery, source: &str) -> Self {
        Self {
            payments: Vec::new(),
            page: query.page(),
            limit: query.limit(),
            total: 0,
            summary: PaymentSummary {
                total_paid: 0,
                total_transactions: 0,
                average_amount: 0,
                sync_rate: 0.0,
            },
            source: source.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Patient-link coverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total: usize,
    pub linked: usize,
    pub coverage_rate: f64,
}

impl CoverageReport {
    pub fn new(total: usize, linked: usize) -> Self {
        let coverage_rate = if total > 0 {
            linked as f64 / total as f64
        } else {
            1.0
        };
        Self { total, linked, coverage_rate }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillReport {
    pub before: CoverageReport,
    pub after: CoverageReport,
    pub repaired: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found for order code {0}")]
    NotFound(i64),

    #[error("Payment gateway is not configured")]
    GatewayNotConfigured,

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Billing service error: {0}")]
    BillingService(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
