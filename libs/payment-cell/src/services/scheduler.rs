use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use shared_config::AppConfig;

use crate::models::PaymentError;
use crate::services::sync::SyncService;

/// Server-side replacement for the old admin-tab interval trigger: the sync
/// job runs on a fixed cadence for the lifetime of the process. At-least-once
/// triggering is fine because the job itself is idempotent.
pub struct SyncScheduler {
    sync: Arc<SyncService>,
    interval_seconds: u64,
    is_shutdown: tokio::sync::RwLock<bool>,
}

impl SyncScheduler {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        Ok(Self {
            sync: Arc::new(SyncService::new(config)?),
            interval_seconds: config.sync_interval_seconds,
            is_shutdown: tokio::sync::RwLock::new(false),
        })
    }

    pub fn with_sync(sync: Arc<SyncService>, interval_seconds: u64) -> Self {
        Self {
            sync,
            interval_seconds,
            is_shutdown: tokio::sync::RwLock::new(false),
        }
    }

    pub async fn run(&self) {
        if self.interval_seconds == 0 {
            info!("Sync scheduler disabled (SYNC_INTERVAL_SECONDS=0)");
            return;
        }

        info!("Sync scheduler starting, every {}s", self.interval_seconds);
        let mut ticker = interval(Duration::from_secs(self.interval_seconds));
        // A slow gateway must not cause a burst of catch-up runs
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if *self.is_shutdown.read().await {
                info!("Sync scheduler received shutdown signal");
                break;
            }

            match self.sync.run().await {
                Ok(report) => {
                    if report.failed > 0 {
                        warn!(
                            "Scheduled sync: {}/{} updated, {} failed",
                            report.updated, report.total, report.failed
                        );
                    }
                }
                Err(e) => {
                    // The next tick is the retry
                    error!("Scheduled sync run failed: {}", e);
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }
}
