use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub payos_base_url: String,
    pub payos_client_id: String,
    pub payos_api_key: String,
    pub billing_service_url: String,
    pub billing_service_timeout_seconds: u64,
    pub sync_job_secret: String,
    pub sync_interval_seconds: u64,
    pub sync_concurrency: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            payos_base_url: env::var("PAYOS_BASE_URL")
                .unwrap_or_else(|_| "https://api-merchant.payos.vn".to_string()),
            payos_client_id: env::var("PAYOS_CLIENT_ID")
                .unwrap_or_else(|_| {
                    warn!("PAYOS_CLIENT_ID not set, using empty value");
                    String::new()
                }),
            payos_api_key: env::var("PAYOS_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("PAYOS_API_KEY not set, using empty value");
                    String::new()
                }),
            billing_service_url: env::var("BILLING_SERVICE_URL")
                .unwrap_or_default(),
            billing_service_timeout_seconds: env::var("BILLING_SERVICE_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            sync_job_secret: env::var("SYNC_JOB_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SYNC_JOB_SECRET not set, sync endpoints will reject all callers");
                    String::new()
                }),
            sync_interval_seconds: env::var("SYNC_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            sync_concurrency: env::var("SYNC_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_gateway_configured(&self) -> bool {
        !self.payos_base_url.is_empty()
            && !self.payos_client_id.is_empty()
            && !self.payos_api_key.is_empty()
    }

    pub fn is_billing_service_configured(&self) -> bool {
        !self.billing_service_url.is_empty()
    }

    pub fn scheduler_enabled(&self) -> bool {
        self.sync_interval_seconds > 0
    }
}
