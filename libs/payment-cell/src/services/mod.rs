pub mod gateway;
pub mod store;
pub mod sync;
pub mod recovery;
pub mod history;
pub mod backfill;
pub mod scheduler;

pub use gateway::PayOsClient;
pub use store::PaymentStore;
pub use sync::SyncService;
pub use recovery::RecoveryService;
pub use history::PaymentHistoryService;
pub use backfill::CoverageService;
pub use scheduler::SyncScheduler;
