use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{
    GatewayPayment, MissingPayment, PaymentConflict, PaymentError, PaymentRecord, PaymentStatus,
    RecoveryAction, RecoveryReport, RecoverySummary, StatusMismatch,
};
use crate::services::{gateway::PayOsClient, store::PaymentStore};

/// Detects divergence between the gateway's transaction list and the local
/// store over a trailing window, and repairs it when asked to. Divergence on
/// settled records is reported as a conflict and never auto-repaired.
pub struct RecoveryService {
    store: Arc<PaymentStore>,
    gateway: Arc<PayOsClient>,
}

struct WindowDiff {
    missing: Vec<GatewayPayment>,
    mismatched: Vec<(PaymentRecord, GatewayPayment, PaymentStatus)>,
    conflicts: Vec<PaymentConflict>,
}

impl RecoveryService {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        Ok(Self {
            store: Arc::new(PaymentStore::new(config)),
            gateway: Arc::new(PayOsClient::new(config)?),
        })
    }

    pub fn with_parts(store: Arc<PaymentStore>, gateway: Arc<PayOsClient>) -> Self {
        Self { store, gateway }
    }

    #[instrument(skip(self))]
    pub async fn run(
        &self,
        hours: i64,
        action: RecoveryAction,
    ) -> Result<RecoveryReport, PaymentError> {
        let now = Utc::now();
        let from = now - Duration::hours(hours);

        let gateway_payments = self.gateway.list_transactions(from, now).await?;
        let local_payments = self.store.list_window(from).await?;
        info!(
            "Recovery window {}h: {} gateway transactions, {} local records",
            hours,
            gateway_payments.len(),
            local_payments.len()
        );

        let summary = RecoverySummary {
            payos_total: gateway_payments.len(),
            database_total: local_payments.len(),
        };

        let diff = Self::diff_window(&gateway_payments, &local_payments);

        let mut recovered = 0;
        let mut updated = 0;
        if action == RecoveryAction::Recover {
            recovered = self.backfill_missing(&diff.missing).await;
            updated = self.patch_mismatched(&diff.mismatched).await;
        }

        Ok(RecoveryReport {
            action,
            window_hours: hours,
            missing: diff
                .missing
                .iter()
                .map(|gw| MissingPayment {
                    order_code: gw.order_code,
                    amount: gw.amount,
                    gateway_status: gw.status.clone(),
                    payment_link_id: gw.id.clone(),
                })
                .collect(),
            status_mismatches: diff
                .mismatched
                .iter()
                .map(|(record, gw, _)| StatusMismatch {
                    order_code: record.order_code,
                    local_status: record.status,
                    gateway_status: gw.status.clone(),
                })
                .collect(),
            conflicts: diff.conflicts,
            summary,
            recovered,
            updated,
        })
    }

    /// Matching is by order code equality only. Duplicate local codes are a
    /// data problem; the first occurrence wins and the rest are logged.
    fn diff_window(
        gateway_payments: &[GatewayPayment],
        local_payments: &[PaymentRecord],
    ) -> WindowDiff {
        let mut local_by_code: HashMap<i64, &PaymentRecord> = HashMap::new();
        for record in local_payments {
            if local_by_code.insert(record.order_code, record).is_some() {
                warn!("Duplicate local order code {} in window", record.order_code);
            }
        }

        let mut diff = WindowDiff {
            missing: Vec::new(),
            mismatched: Vec::new(),
            conflicts: Vec::new(),
        };

        for gw in gateway_payments {
            let Some(target) = gw.local_status() else {
                warn!(
                    "Unrecognised gateway status '{}' for order code {}, skipping",
                    gw.status, gw.order_code
                );
                continue;
            };

            let Some(record) = local_by_code.get(&gw.order_code) else {
                diff.missing.push(gw.clone());
                continue;
            };

            if record.status.is_settled() {
                // Settled records are immutable here; flag anything the
                // gateway disagrees about for manual review.
                if target != PaymentStatus::Completed {
                    diff.conflicts.push(PaymentConflict {
                        order_code: record.order_code,
                        local_status: record.status,
                        local_amount: record.amount,
                        gateway_status: gw.status.clone(),
                        gateway_amount: gw.amount,
                        reason: "gateway status regressed on settled payment".to_string(),
                    });
                } else if record.amount != gw.amount {
                    diff.conflicts.push(PaymentConflict {
                        order_code: record.order_code,
                        local_status: record.status,
                        local_amount: record.amount,
                        gateway_status: gw.status.clone(),
                        gateway_amount: gw.amount,
                        reason: "amount differs on settled payment".to_string(),
                    });
                }
                continue;
            }

            if record.status != target {
                diff.mismatched
                    .push(((*record).clone(), gw.clone(), target));
            }
        }

        diff
    }

    async fn backfill_missing(&self, missing: &[GatewayPayment]) -> usize {
        let mut recovered = 0;
        for gw in missing {
            let Some(status) = gw.local_status() else { continue };

            // The window diff can miss records created before the window;
            // re-check before inserting to keep order codes unique.
            match self.store.find_by_order_code(gw.order_code).await {
                Ok(Some(_)) => {
                    warn!(
                        "Order code {} exists outside the window, skipping backfill",
                        gw.order_code
                    );
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Backfill lookup failed for order code {}: {}", gw.order_code, e);
                    continue;
                }
            }

            match self.store.insert_recovered(gw, status).await {
                Ok(_) => {
                    info!("Recovered missing payment for order code {}", gw.order_code);
                    recovered += 1;
                }
                Err(e) => {
                    warn!("Backfill failed for order code {}: {}", gw.order_code, e);
                }
            }
        }
        recovered
    }

    async fn patch_mismatched(
        &self,
        mismatched: &[(PaymentRecord, GatewayPayment, PaymentStatus)],
    ) -> usize {
        let mut updated = 0;
        for (record, gw, target) in mismatched {
            match self.store.apply_gateway_status(record, *target, gw).await {
                Ok(_) => {
                    info!(
                        "Order code {} patched: {} -> {}",
                        record.order_code, record.status, target
                    );
                    updated += 1;
                }
                Err(e) => {
                    warn!("Patch failed for order code {}: {}", record.order_code, e);
                }
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn local(order_code: i64, amount: i64, status: PaymentStatus) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            order_code,
            amount,
            status,
            payment_method: Some("payos".to_string()),
            doctor_id: None,
            patient_id: Some(Uuid::new_v4()),
            transaction_id: None,
            payment_link_id: None,
            record_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            paid_at: None,
        }
    }

    fn remote(order_code: i64, amount: i64, status: &str) -> GatewayPayment {
        GatewayPayment {
            id: format!("link-{}", order_code),
            order_code,
            amount,
            amount_paid: if status == "PAID" { amount } else { 0 },
            status: status.to_string(),
            created_at: Utc::now(),
            transactions: vec![],
        }
    }

    #[test]
    fn test_gateway_only_payment_is_missing() {
        let diff = RecoveryService::diff_window(
            &[remote(123, 1000, "PAID")],
            &[],
        );
        assert_eq!(diff.missing.len(), 1);
        assert_eq!(diff.missing[0].order_code, 123);
        assert!(diff.mismatched.is_empty());
        assert!(diff.conflicts.is_empty());
    }

    #[test]
    fn test_matching_status_produces_no_findings() {
        let diff = RecoveryService::diff_window(
            &[remote(1, 1000, "PAID"), remote(2, 2000, "PENDING")],
            &[
                local(1, 1000, PaymentStatus::Completed),
                local(2, 2000, PaymentStatus::Pending),
            ],
        );
        assert!(diff.missing.is_empty());
        assert!(diff.mismatched.is_empty());
        assert!(diff.conflicts.is_empty());
    }

    #[test]
    fn test_unsettled_divergence_is_a_mismatch() {
        let diff = RecoveryService::diff_window(
            &[remote(7, 1000, "PAID")],
            &[local(7, 1000, PaymentStatus::Processing)],
        );
        assert_eq!(diff.mismatched.len(), 1);
        assert_eq!(diff.mismatched[0].2, PaymentStatus::Completed);
        assert!(diff.conflicts.is_empty());
    }

    #[test]
    fn test_settled_regression_is_a_conflict_not_a_mismatch() {
        let diff = RecoveryService::diff_window(
            &[remote(9, 1000, "PENDING")],
            &[local(9, 1000, PaymentStatus::Completed)],
        );
        assert!(diff.mismatched.is_empty());
        assert_eq!(diff.conflicts.len(), 1);
        assert_eq!(diff.conflicts[0].order_code, 9);
    }

    #[test]
    fn test_settled_amount_divergence_is_a_conflict() {
        let diff = RecoveryService::diff_window(
            &[remote(11, 5000, "PAID")],
            &[local(11, 1000, PaymentStatus::Completed)],
        );
        assert!(diff.mismatched.is_empty());
        assert_eq!(diff.conflicts.len(), 1);
        assert_eq!(diff.conflicts[0].gateway_amount, 5000);
        assert_eq!(diff.conflicts[0].local_amount, 1000);
    }

    #[test]
    fn test_unknown_gateway_status_is_skipped() {
        let diff = RecoveryService::diff_window(
            &[remote(13, 1000, "UNDER_REVIEW")],
            &[],
        );
        assert!(diff.missing.is_empty());
    }
}
