use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;

use crate::models::{PaymentError, PaymentRecord, PaymentStatus, SyncReport};
use crate::services::{gateway::PayOsClient, store::PaymentStore};

/// Brings locally pending/processing payments up to date with the gateway.
/// Each scheduled invocation is the retry mechanism: per-record failures are
/// logged and the record is picked up again on the next run.
pub struct SyncService {
    store: Arc<PaymentStore>,
    gateway: Arc<PayOsClient>,
    concurrency: usize,
}

impl SyncService {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        Ok(Self {
            store: Arc::new(PaymentStore::new(config)),
            gateway: Arc::new(PayOsClient::new(config)?),
            concurrency: config.sync_concurrency.max(1),
        })
    }

    pub fn with_parts(
        store: Arc<PaymentStore>,
        gateway: Arc<PayOsClient>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            gateway,
            concurrency: concurrency.max(1),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncReport, PaymentError> {
        let started = Instant::now();

        let records = self.store.list_unsettled().await?;
        let total = records.len();
        info!("Sync job starting over {} unsettled payments", total);

        let results: Vec<(i64, Result<bool, PaymentError>)> = stream::iter(records)
            .map(|record| {
                let store = Arc::clone(&self.store);
                let gateway = Arc::clone(&self.gateway);
                async move {
                    let order_code = record.order_code;
                    (order_code, Self::sync_record(&store, &gateway, record).await)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut updated = 0;
        let mut failed = 0;
        for (order_code, result) in results {
            match result {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Sync failed for order code {}: {}", order_code, e);
                    failed += 1;
                }
            }
        }

        let report = SyncReport {
            total,
            updated,
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Sync job finished: {}/{} updated, {} failed, {}ms",
            report.updated, report.total, report.failed, report.duration_ms
        );
        Ok(report)
    }

    /// Reconcile one record. Returns whether a write occurred.
    async fn sync_record(
        store: &PaymentStore,
        gateway: &PayOsClient,
        record: PaymentRecord,
    ) -> Result<bool, PaymentError> {
        let gateway_payment = match gateway.get_payment_request(record.order_code).await {
            Ok(payment) => payment,
            Err(PaymentError::NotFound(order_code)) => {
                // The gateway never saw this order; nothing to reconcile against
                warn!("Order code {} unknown to gateway, skipping", order_code);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let Some(target) = gateway_payment.local_status() else {
            warn!(
                "Unrecognised gateway status '{}' for order code {}, skipping",
                gateway_payment.status, record.order_code
            );
            return Ok(false);
        };

        // Status is monotonic: a settled record is never reopened here.
        // Recovery reports such divergence as a conflict instead.
        if record.status.is_settled() && target != PaymentStatus::Completed {
            warn!(
                "Gateway reports {} for settled order code {}, leaving record untouched",
                gateway_payment.status, record.order_code
            );
            return Ok(false);
        }

        if target == record.status {
            debug!("Order code {} already in sync", record.order_code);
            return Ok(false);
        }

        store
            .apply_gateway_status(&record, target, &gateway_payment)
            .await?;
        info!(
            "Order code {} updated: {} -> {}",
            record.order_code, record.status, target
        );
        Ok(true)
    }
}
