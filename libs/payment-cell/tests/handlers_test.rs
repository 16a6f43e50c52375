use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{Extension, Query, State},
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path, header, query_param, query_param_is_missing};

use payment_cell::handlers::payment_history;
use payment_cell::models::PaymentHistoryQuery;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_utils::test_utils::{TestUser, JwtTestUtils};

fn test_config(supabase_url: &str, payos_url: &str) -> AppConfig {
    AppConfig {
        supabase_url: supabase_url.to_string(),
        supabase_service_role_key: "test-service-role-key".to_string(),
        supabase_jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
        payos_base_url: payos_url.to_string(),
        payos_client_id: "test-client-id".to_string(),
        payos_api_key: "test-api-key".to_string(),
        billing_service_url: String::new(),
        billing_service_timeout_seconds: 1,
        sync_job_secret: "test-sync-job-secret".to_string(),
        sync_interval_seconds: 0,
        sync_concurrency: 2,
        port: 3000,
    }
}

fn user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    TypedHeader(Authorization::bearer(token).unwrap())
}

fn payment_row(order_code: i64, status: &str, patient_id: &str, amount: i64) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "order_code": order_code,
        "amount": amount,
        "status": status,
        "payment_method": "payos",
        "doctor_id": null,
        "patient_id": patient_id,
        "transaction_id": if status == "completed" { json!(format!("FT{}", order_code)) } else { json!(null) },
        "payment_link_id": null,
        "record_id": null,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z",
        "paid_at": if status == "completed" { json!("2024-01-01T00:05:00Z") } else { json!(null) }
    })
}

#[tokio::test]
async fn test_patient_sees_only_their_own_payments() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri(), "http://payos.invalid");

    let patient_user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));
    let patient_id = Uuid::new_v4().to_string();

    // Profile resolves to a patient row
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("profile_id", format!("eq.{}", patient_user.id)))
        .and(header("Authorization", format!("Bearer {}", token)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id }
        ])))
        .mount(&mock_server)
        .await;

    // Page query is scoped to that patient id
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            payment_row(1001, "completed", &patient_id, 150000),
            payment_row(1002, "pending", &patient_id, 90000),
        ])))
        .mount(&mock_server)
        .await;

    // Aggregate query for the summary, same patient scope
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("select", "amount,status,transaction_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 150000, "status": "completed", "transaction_id": "FT1001" },
            { "amount": 90000, "status": "pending", "transaction_id": null },
        ])))
        .mount(&mock_server)
        .await;

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(PaymentHistoryQuery::default()),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["payments"].as_array().unwrap().len(), 2);
    assert_eq!(response["source"], "database");
    assert_eq!(response["summary"]["total_paid"], 150000);
    assert_eq!(response["summary"]["total_transactions"], 2);
    assert_eq!(response["summary"]["average_amount"], 150000);
    for payment in response["payments"].as_array().unwrap() {
        assert_eq!(payment["patient_id"], patient_id);
    }
}

#[tokio::test]
async fn test_profile_without_patient_row_gets_empty_page() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri(), "http://payos.invalid");

    let patient_user = TestUser::patient("new-patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("profile_id", format!("eq.{}", patient_user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    // No payments query must ever be issued for an unresolved profile
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(PaymentHistoryQuery::default()),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["payments"].as_array().unwrap().len(), 0);
    assert_eq!(response["total"], 0);
    assert_eq!(response["source"], "database");
}

#[tokio::test]
async fn test_admin_history_is_not_patient_scoped() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri(), "http://payos.invalid");

    let admin_user = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin_user, &config.supabase_jwt_secret, Some(24));
    let some_patient = Uuid::new_v4().to_string();

    // Admins skip patient resolution entirely
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param_is_missing("patient_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            payment_row(2001, "completed", &some_patient, 200000),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("select", "amount,status,transaction_id"))
        .and(query_param_is_missing("patient_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 200000, "status": "completed", "transaction_id": "FT2001" },
        ])))
        .mount(&mock_server)
        .await;

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&admin_user),
        Query(PaymentHistoryQuery::default()),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["payments"].as_array().unwrap().len(), 1);
    assert_eq!(response["total"], 1);
}

#[tokio::test]
async fn test_pagination_maps_page_to_offset() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri(), "http://payos.invalid");

    let patient_user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id }
        ])))
        .mount(&mock_server)
        .await;

    // Page 3 with limit 5 must request offset 10; disjointness between pages
    // follows from PostgREST's stable ordering on created_at
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("limit", "5"))
        .and(query_param("offset", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            payment_row(3001, "completed", &patient_id, 50000),
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("select", "amount,status,transaction_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 50000, "status": "completed", "transaction_id": "FT3001" },
        ])))
        .mount(&mock_server)
        .await;

    let query = PaymentHistoryQuery {
        page: Some(3),
        limit: Some(5),
        ..Default::default()
    };

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(query),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["page"], 3);
    assert_eq!(response["limit"], 5);
}

#[tokio::test]
async fn test_huge_page_number_yields_empty_page_not_panic() {
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri(), "http://payos.invalid");

    let patient_user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id }
        ])))
        .mount(&mock_server)
        .await;

    // (u32::MAX - 1) * 100, which only fits once the offset is widened
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("limit", "100"))
        .and(query_param("offset", "429496729400"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("select", "amount,status,transaction_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let query = PaymentHistoryQuery {
        page: Some(u32::MAX),
        limit: Some(100),
        ..Default::default()
    };

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(query),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["payments"].as_array().unwrap().len(), 0);
    assert_eq!(response["page"], u32::MAX);
}

#[tokio::test]
async fn test_billing_service_failure_falls_back_to_database() {
    let supabase = MockServer::start().await;
    let billing = MockServer::start().await;

    let mut config = test_config(&supabase.uri(), "http://payos.invalid");
    config.billing_service_url = billing.uri();

    let patient_user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id }
        ])))
        .mount(&supabase)
        .await;

    // Billing service is up but broken
    Mock::given(method("GET"))
        .and(path("/payments/history"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&billing)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            payment_row(4001, "completed", &patient_id, 75000),
        ])))
        .mount(&supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("select", "amount,status,transaction_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 75000, "status": "completed", "transaction_id": "FT4001" },
        ])))
        .mount(&supabase)
        .await;

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(PaymentHistoryQuery::default()),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["source"], "database");
    assert_eq!(response["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_billing_service_timeout_falls_back_to_database() {
    let supabase = MockServer::start().await;
    let billing = MockServer::start().await;

    let mut config = test_config(&supabase.uri(), "http://payos.invalid");
    config.billing_service_url = billing.uri();

    let patient_user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id }
        ])))
        .mount(&supabase)
        .await;

    // The billing service answers correctly, but slower than the 1s budget
    Mock::given(method("GET"))
        .and(path("/payments/history"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "payments": [],
                    "page": 1,
                    "limit": 20,
                    "total": 0,
                    "summary": {
                        "total_paid": 0,
                        "total_transactions": 0,
                        "average_amount": 0,
                        "sync_rate": 0.0
                    },
                    "source": "billing-service"
                }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&billing)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            payment_row(4101, "completed", &patient_id, 80000),
        ])))
        .mount(&supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .and(query_param("select", "amount,status,transaction_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "amount": 80000, "status": "completed", "transaction_id": "FT4101" },
        ])))
        .mount(&supabase)
        .await;

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(PaymentHistoryQuery::default()),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["source"], "database");
    assert_eq!(response["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_billing_service_success_is_preferred() {
    let supabase = MockServer::start().await;
    let billing = MockServer::start().await;

    let mut config = test_config(&supabase.uri(), "http://payos.invalid");
    config.billing_service_url = billing.uri();

    let patient_user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&patient_user, &config.supabase_jwt_secret, Some(24));
    let patient_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id }
        ])))
        .mount(&supabase)
        .await;

    Mock::given(method("GET"))
        .and(path("/payments/history"))
        .and(query_param("patient_id", &patient_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payments": [payment_row(5001, "completed", &patient_id, 120000)],
            "page": 1,
            "limit": 20,
            "total": 1,
            "summary": {
                "total_paid": 120000,
                "total_transactions": 1,
                "average_amount": 120000,
                "sync_rate": 1.0
            },
            "source": "billing-service"
        })))
        .mount(&billing)
        .await;

    // The direct store must not be queried when the billing service answers
    Mock::given(method("GET"))
        .and(path("/rest/v1/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&supabase)
        .await;

    let result = payment_history(
        State(Arc::new(config)),
        auth_header(&token),
        user_extension(&patient_user),
        Query(PaymentHistoryQuery::default()),
    )
    .await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response["source"], "billing-service");
    assert_eq!(response["summary"]["total_paid"], 120000);
}
