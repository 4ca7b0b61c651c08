mod common;

use tuitiond::api::{ApiClient, ApiError};
use tuitiond::config::Config;
use tuitiond::domain::{LoginPayload, UpdateFee};
use uuid::Uuid;

fn client_for(base_url: &str) -> ApiClient {
    let config = Config::default().with_api_url(base_url).expect("config");
    ApiClient::new(&config).expect("client")
}

#[tokio::test]
async fn login_stores_token_and_sends_bearer_header() {
    let backend = common::start();
    let client = client_for(&backend.base_url);

    let err = client.me().await.expect_err("me without token");
    assert!(matches!(&err, ApiError::Status { status: 401, message, .. } if message == "Unauthorized"));
    assert_eq!(backend.state.header("authorization"), None);

    let res = client
        .login(&LoginPayload {
            email: "admin@example.com".to_string(),
            password: "secret".to_string(),
        })
        .await
        .expect("login");
    assert_eq!(res.token, common::TOKEN);
    assert!(client.tokens().is_set());

    let me = client.me().await.expect("me");
    assert_eq!(me.email, "admin@example.com");
    assert_eq!(
        backend.state.header("authorization").as_deref(),
        Some("Bearer tok-123")
    );
    let request_id = backend.state.header("x-request-id").expect("request id");
    assert!(Uuid::parse_str(&request_id).is_ok());

    client.logout();
    assert!(client.me().await.is_err());
}

#[tokio::test]
async fn bad_credentials_are_not_retried() {
    let backend = common::start();
    let client = client_for(&backend.base_url);
    let err = client
        .login(&LoginPayload {
            email: "admin@example.com".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .expect_err("login must fail");
    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("Invalid credentials"));
    assert_eq!(backend.state.hits("login"), 1);
    assert!(!client.tokens().is_set());
}

#[tokio::test]
async fn list_envelope_and_not_found_are_decoded() {
    let backend = common::start();
    let client = client_for(&backend.base_url);

    let classes = client.list_classes(None).await.expect("classes");
    assert_eq!(classes.items.len(), 2);
    assert_eq!(classes.total, Some(2));
    assert_eq!(classes.items[0].fee_per_month_inr, 1500.0);

    let students = client.list_students(None).await.expect("students");
    assert_eq!(students.items[2].class_id(), Some("c1"));

    let err = client.get_class("nope").await.expect_err("missing class");
    match err {
        ApiError::Status { status, message, body } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Class not found");
            assert!(body.is_some());
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(backend.state.hits("class"), 1);
}

#[tokio::test]
async fn server_errors_are_retried_for_queries() {
    let backend = common::start();
    let client = client_for(&backend.base_url);
    let report = client.dashboard_report().await.expect("dashboard after retry");
    assert_eq!(report.total_students, 4);
    assert_eq!(report.financials.status, "Loss");
    assert_eq!(backend.state.hits("dashboard"), 2);
}

#[tokio::test]
async fn mutations_send_json_and_accept_empty_bodies() {
    let backend = common::start();
    let client = client_for(&backend.base_url);

    let fee = client
        .update_fee(
            "f2",
            &UpdateFee {
                paid_inr: Some(1400.0),
                ..Default::default()
            },
        )
        .await
        .expect("update fee");
    assert_eq!(fee.paid_inr, 1400.0);

    client.delete_fee("f4").await.expect("delete fee");
    let fees = client.list_fees(None).await.expect("fees");
    assert_eq!(fees.items.len(), 3);
}
