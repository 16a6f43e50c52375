use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    GatewayPayment, PaymentError, PaymentHistoryQuery, PaymentRecord, PaymentStatus,
};

/// Columns needed to compute history aggregates without paging the full
/// record set through the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentAggregateRow {
    pub amount: i64,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientLinkRow {
    pub patient_id: Option<Uuid>,
}

/// Access layer for the `payments` table. Records are only ever inserted or
/// patched, never deleted.
pub struct PaymentStore {
    supabase: SupabaseClient,
}

impl PaymentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn representation_headers() -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );
        headers
    }

    /// All pending/processing records that carry an order code, oldest first.
    pub async fn list_unsettled(&self) -> Result<Vec<PaymentRecord>, PaymentError> {
        let path = "/rest/v1/payments?status=in.(pending,processing)&order_code=not.is.null&order=created_at.asc";
        let result: Vec<PaymentRecord> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        debug!("Found {} unsettled payments", result.len());
        Ok(result)
    }

    /// All records created inside the trailing window, for the recovery diff.
    pub async fn list_window(
        &self,
        from: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, PaymentError> {
        let path = format!(
            "/rest/v1/payments?created_at=gte.{}&order=created_at.asc",
            urlencoding::encode(&from.to_rfc3339())
        );
        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))
    }

    pub async fn find_by_order_code(
        &self,
        order_code: i64,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let path = format!("/rest/v1/payments?order_code=eq.{}", order_code);
        let result: Vec<PaymentRecord> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    /// Patch a record to the gateway's status. Sets `paid_at` exactly when
    /// the record transitions to completed, and copies gateway identifiers
    /// when the gateway provides them.
    pub async fn apply_gateway_status(
        &self,
        record: &PaymentRecord,
        status: PaymentStatus,
        gateway: &GatewayPayment,
    ) -> Result<PaymentRecord, PaymentError> {
        let mut update = serde_json::Map::new();
        update.insert("status".to_string(), json!(status));
        update.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        if status == PaymentStatus::Completed && record.paid_at.is_none() {
            update.insert("paid_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        if record.payment_link_id.is_none() {
            update.insert("payment_link_id".to_string(), json!(gateway.id));
        }
        if record.transaction_id.is_none() {
            if let Some(reference) = gateway.transaction_reference() {
                update.insert("transaction_id".to_string(), json!(reference));
            }
        }

        let path = format!("/rest/v1/payments?id=eq.{}", record.id);
        let result: Vec<PaymentRecord> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(Value::Object(update)),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::Database("Update returned no rows".to_string()))
    }

    /// Backfill a record that exists at the gateway but not locally. The
    /// patient link is unknown at this point; the coverage job repairs it.
    pub async fn insert_recovered(
        &self,
        gateway: &GatewayPayment,
        status: PaymentStatus,
    ) -> Result<PaymentRecord, PaymentError> {
        let now = Utc::now().to_rfc3339();
        let payment_data = json!({
            "order_code": gateway.order_code,
            "amount": gateway.amount,
            "status": status,
            "payment_method": "payos",
            "transaction_id": gateway.transaction_reference(),
            "payment_link_id": gateway.id,
            "created_at": gateway.created_at.to_rfc3339(),
            "updated_at": now,
            "paid_at": if status == PaymentStatus::Completed { Some(now.clone()) } else { None },
        });

        let result: Vec<PaymentRecord> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/payments",
                None,
                Some(payment_data),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::Database("Insert returned no rows".to_string()))
    }

    // -- history read path ---------------------------------------------------

    fn history_filter_parts(
        patient_id: Option<Uuid>,
        query: &PaymentHistoryQuery,
    ) -> Vec<String> {
        let mut parts = Vec::new();

        if let Some(patient_id) = patient_id {
            parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(start) = query.start_date {
            parts.push(format!(
                "created_at=gte.{}",
                urlencoding::encode(&start.to_rfc3339())
            ));
        }
        if let Some(end) = query.end_date {
            parts.push(format!(
                "created_at=lte.{}",
                urlencoding::encode(&end.to_rfc3339())
            ));
        }
        if let Some(order_code) = query.order_code {
            parts.push(format!("order_code=eq.{}", order_code));
        }
        if let Some(doctor_id) = query.doctor_id {
            parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        parts
    }

    /// One page of a patient's (or, for admins, everyone's) history,
    /// newest first.
    pub async fn history_page(
        &self,
        patient_id: Option<Uuid>,
        query: &PaymentHistoryQuery,
        auth_token: &str,
    ) -> Result<Vec<PaymentRecord>, PaymentError> {
        let mut parts = Self::history_filter_parts(patient_id, query);

        let limit = query.limit();
        // Widen before multiplying: page is caller-controlled and u32 offset
        // arithmetic overflows at large page numbers
        let offset = (query.page() as u64 - 1) * limit as u64;
        parts.push("order=created_at.desc".to_string());
        parts.push(format!("limit={}", limit));
        parts.push(format!("offset={}", offset));

        let path = format!("/rest/v1/payments?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))
    }

    /// Aggregate columns for the full filtered set backing the page summary.
    pub async fn history_aggregates(
        &self,
        patient_id: Option<Uuid>,
        query: &PaymentHistoryQuery,
        auth_token: &str,
    ) -> Result<Vec<PaymentAggregateRow>, PaymentError> {
        let mut parts = Self::history_filter_parts(patient_id, query);
        parts.push("select=amount,status,transaction_id".to_string());

        let path = format!("/rest/v1/payments?{}", parts.join("&"));
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))
    }

    /// Resolve an authenticated profile to its patient row.
    pub async fn resolve_patient_id(
        &self,
        profile_id: &str,
        auth_token: &str,
    ) -> Result<Option<Uuid>, PaymentError> {
        #[derive(Deserialize)]
        struct PatientIdRow {
            id: Uuid,
        }

        let path = format!(
            "/rest/v1/patients?profile_id=eq.{}&select=id",
            urlencoding::encode(profile_id)
        );
        let result: Vec<PatientIdRow> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        Ok(result.into_iter().next().map(|row| row.id))
    }

    // -- patient-link coverage -----------------------------------------------

    pub async fn patient_link_rows(&self) -> Result<Vec<PatientLinkRow>, PaymentError> {
        let path = "/rest/v1/payments?select=patient_id";
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))
    }

    /// Records missing a patient link but carrying a medical record link the
    /// backfill job can follow.
    pub async fn list_unlinked(&self) -> Result<Vec<PaymentRecord>, PaymentError> {
        let path = "/rest/v1/payments?patient_id=is.null&record_id=not.is.null&order=created_at.asc";
        self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))
    }

    pub async fn medical_record_patient(
        &self,
        record_id: Uuid,
    ) -> Result<Option<Uuid>, PaymentError> {
        #[derive(Deserialize)]
        struct MedicalRecordRow {
            patient_id: Uuid,
        }

        let path = format!(
            "/rest/v1/medical_records?id=eq.{}&select=patient_id",
            record_id
        );
        let result: Vec<MedicalRecordRow> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        Ok(result.into_iter().next().map(|row| row.patient_id))
    }

    pub async fn link_patient(
        &self,
        payment_id: Uuid,
        patient_id: Uuid,
    ) -> Result<PaymentRecord, PaymentError> {
        let update = json!({
            "patient_id": patient_id,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/payments?id=eq.{}", payment_id);
        let result: Vec<PaymentRecord> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(update),
                Some(Self::representation_headers()),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::Database("Update returned no rows".to_string()))
    }
}
