use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{GatewayPayment, GatewayResponse, PaymentError};

/// PayOS merchant API client. The gateway is the source of truth for
/// transaction status during reconciliation.
pub struct PayOsClient {
    client: Client,
    base_url: String,
    client_id: String,
    api_key: String,
}

impl PayOsClient {
    pub fn new(config: &AppConfig) -> Result<Self, PaymentError> {
        if !config.is_gateway_configured() {
            return Err(PaymentError::GatewayNotConfigured);
        }

        Ok(Self {
            client: Client::new(),
            base_url: config.payos_base_url.clone(),
            client_id: config.payos_client_id.clone(),
            api_key: config.payos_api_key.clone(),
        })
    }

    /// Fetch the authoritative state of one payment request.
    /// GET /v2/payment-requests/{orderCode}
    pub async fn get_payment_request(
        &self,
        order_code: i64,
    ) -> Result<GatewayPayment, PaymentError> {
        let url = format!("{}/v2/payment-requests/{}", self.base_url, order_code);
        debug!("Querying gateway for order code {}", order_code);

        let response = self
            .client
            .get(&url)
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if status.as_u16() == 404 {
            return Err(PaymentError::NotFound(order_code));
        }

        if !status.is_success() {
            error!("Gateway query failed: {} - {}", status, response_text);
            return Err(PaymentError::Gateway(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        let parsed: GatewayResponse<GatewayPayment> = serde_json::from_str(&response_text)
            .map_err(|e| PaymentError::Gateway(format!("Failed to parse response: {}", e)))?;

        if parsed.code != "00" {
            return Err(PaymentError::Gateway(format!(
                "Gateway returned code {}: {}",
                parsed.code, parsed.desc
            )));
        }

        parsed
            .data
            .ok_or_else(|| PaymentError::NotFound(order_code))
    }

    /// List all gateway payment requests created inside a time window.
    /// GET /v2/payment-requests?fromDate=...&toDate=...
    pub async fn list_transactions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GatewayPayment>, PaymentError> {
        let url = format!(
            "{}/v2/payment-requests?fromDate={}&toDate={}",
            self.base_url,
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );
        debug!("Listing gateway transactions from {} to {}", from, to);

        let response = self
            .client
            .get(&url)
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !status.is_success() {
            error!("Gateway listing failed: {} - {}", status, response_text);
            return Err(PaymentError::Gateway(format!(
                "HTTP {}: {}",
                status, response_text
            )));
        }

        let parsed: GatewayResponse<Vec<GatewayPayment>> = serde_json::from_str(&response_text)
            .map_err(|e| PaymentError::Gateway(format!("Failed to parse response: {}", e)))?;

        if parsed.code != "00" {
            return Err(PaymentError::Gateway(format!(
                "Gateway returned code {}: {}",
                parsed.code, parsed.desc
            )));
        }

        Ok(parsed.data.unwrap_or_default())
    }
}
