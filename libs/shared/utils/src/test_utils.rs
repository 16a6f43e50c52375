use std::sync::Arc;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub payos_url: String,
    pub sync_job_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            payos_url: "http://localhost:54322".to_string(),
            sync_job_secret: "test-sync-job-secret".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            payos_base_url: self.payos_url.clone(),
            payos_client_id: "test-client-id".to_string(),
            payos_api_key: "test-api-key".to_string(),
            billing_service_url: String::new(),
            billing_service_timeout_seconds: 1,
            sync_job_secret: self.sync_job_secret.clone(),
            sync_interval_seconds: 0,
            sync_concurrency: 2,
            port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let claims = JwtClaims {
            sub: user.id.clone(),
            exp: Some(exp.timestamp() as u64),
            email: Some(user.email.clone()),
            role: Some(user.role.clone()),
            app_metadata: None,
            user_metadata: None,
            aud: Some("authenticated".to_string()),
            iat: Some(now.timestamp() as u64),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("test token encoding cannot fail")
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_row(profile_id: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "profile_id": profile_id,
            "email": "test@example.com",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn payment_row(order_code: i64, status: &str, patient_id: Option<&str>) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "order_code": order_code,
            "amount": 150000,
            "status": status,
            "payment_method": "payos",
            "doctor_id": null,
            "patient_id": patient_id,
            "transaction_id": null,
            "payment_link_id": null,
            "record_id": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "paid_at": if status == "completed" { json!("2024-01-01T00:05:00Z") } else { json!(null) }
        })
    }

    pub fn gateway_payment(order_code: i64, status: &str, amount: i64) -> serde_json::Value {
        json!({
            "code": "00",
            "desc": "success",
            "data": {
                "orderCode": order_code,
                "amount": amount,
                "amountPaid": if status == "PAID" { amount } else { 0 },
                "status": status,
                "id": format!("link-{}", order_code),
                "createdAt": "2024-01-01T00:00:00Z",
                "transactions": []
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::validate_token;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_configured());
        assert!(!app_config.scheduler_enabled());
    }

    #[test]
    fn test_token_round_trip() {
        let user = TestUser::patient("patient@example.com");
        let secret = "test-secret-key-for-jwt-validation-must-be-long-enough";
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        let validated = validate_token(&token, secret).expect("token should validate");
        assert_eq!(validated.id, user.id);
        assert_eq!(validated.role, Some("patient".to_string()));
    }

    #[test]
    fn test_expired_token_rejected() {
        let user = TestUser::default();
        let secret = "test-secret-key-for-jwt-validation-must-be-long-enough";
        let token = JwtTestUtils::create_expired_token(&user, secret);

        assert!(validate_token(&token, secret).is_err());
    }

    #[test]
    fn test_wrong_signature_rejected() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_invalid_signature_token(&user);

        assert!(validate_token(&token, "the-real-secret").is_err());
    }
}
