use std::sync::Arc;

use tracing::{info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{BackfillReport, CoverageReport, PaymentError};
use crate::services::store::PaymentStore;

/// Every payment should eventually carry a patient link. This job measures
/// how true that is and repairs records whose medical record link lets the
/// patient be resolved.
pub struct CoverageService {
    store: Arc<PaymentStore>,
}

impl CoverageService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            store: Arc::new(PaymentStore::new(config)),
        }
    }

    pub fn with_store(store: Arc<PaymentStore>) -> Self {
        Self { store }
    }

    pub async fn coverage(&self) -> Result<CoverageReport, PaymentError> {
        let rows = self.store.patient_link_rows().await?;
        let linked = rows.iter().filter(|row| row.patient_id.is_some()).count();
        Ok(CoverageReport::new(rows.len(), linked))
    }

    /// Repair pass with before/after coverage so the repair itself is
    /// auditable. Per-record failures are logged and skipped.
    #[instrument(skip(self))]
    pub async fn run_backfill(&self) -> Result<BackfillReport, PaymentError> {
        let before = self.coverage().await?;
        info!(
            "Patient-link backfill starting, coverage {}/{}",
            before.linked, before.total
        );

        let unlinked = self.store.list_unlinked().await?;
        let mut repaired = 0;
        let mut failed = 0;

        for payment in unlinked {
            let Some(record_id) = payment.record_id else { continue };

            let patient_id = match self.store.medical_record_patient(record_id).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    warn!(
                        "Medical record {} for order code {} has no patient",
                        record_id, payment.order_code
                    );
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Patient lookup failed for order code {}: {}",
                        payment.order_code, e
                    );
                    failed += 1;
                    continue;
                }
            };

            match self.store.link_patient(payment.id, patient_id).await {
                Ok(_) => {
                    info!(
                        "Linked order code {} to patient {}",
                        payment.order_code, patient_id
                    );
                    repaired += 1;
                }
                Err(e) => {
                    warn!(
                        "Patient link failed for order code {}: {}",
                        payment.order_code, e
                    );
                    failed += 1;
                }
            }
        }

        let after = self.coverage().await?;
        info!(
            "Patient-link backfill finished: {} repaired, {} failed, coverage {}/{}",
            repaired, failed, after.linked, after.total
        );

        Ok(BackfillReport {
            before,
            after,
            repaired,
            failed,
        })
    }
}
