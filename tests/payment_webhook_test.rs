mod common;

use std::collections::BTreeMap;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

use common::{body_json, to_query, TestApp};

async fn create_paid_for_order(app: &TestApp) -> Value {
    let tier = app
        .seed_pricing_record(dec!(20000), dec!(5), dec!(5000), dec!(10000))
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "sender_name": "Nguyen Van A",
                "receiver_name": "Tran Thi B",
                "receiver_phone": "0912345678",
                "pickup_address": "12 Hang Bac, Hoan Kiem",
                "delivery_address": "45 Le Loi, District 1",
                "origin_province": "HN",
                "dest_province": "HCM",
                "service_tier_id": tier,
                "weight_kg": "2",
                "cod_value": "150000",
                "payment_method": "gateway"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await["data"].clone();

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments",
            Some(json!({
                "order_id": order["id"],
                "method": "gateway"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let payment = body_json(response).await["data"].clone();
    assert_eq!(payment["status"], "pending");
    assert!(payment["redirect_url"].as_str().unwrap().contains("vnp_SecureHash="));

    order
}

/// Success callback for the order's waybill and exact amount. The order totals
/// 180000 (30000 shipping + 150000 COD), so the gateway amount is x100.
fn success_params(order: &Value) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert(
        "vnp_TxnRef".to_string(),
        order["waybill"].as_str().unwrap().to_string(),
    );
    params.insert("vnp_Amount".to_string(), "18000000".to_string());
    params.insert("vnp_ResponseCode".to_string(), "00".to_string());
    params.insert("vnp_TransactionStatus".to_string(), "00".to_string());
    params.insert("vnp_TransactionNo".to_string(), "GW0042".to_string());
    params
}

async fn send_ipn(app: &TestApp, params: &BTreeMap<String, String>) -> Value {
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/payments/gateway/ipn?{}", to_query(params)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn fetch_order(app: &TestApp, order: &Value) -> Value {
    let id = order["id"].as_str().unwrap();
    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{id}"), None)
        .await;
    body_json(response).await["data"].clone()
}

#[tokio::test]
async fn valid_callback_confirms_order_and_marks_payment_paid() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    app.sign_callback(&mut params);

    let body = send_ipn(&app, &params).await;
    assert_eq!(body["RspCode"], "00");

    let refreshed = fetch_order(&app, &order).await;
    assert_eq!(refreshed["status"], "confirmed");

    let payment = app
        .state
        .services
        .payments
        .latest_payment(Uuid::parse_str(order["id"].as_str().unwrap()).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, "paid");
    assert_eq!(payment.transaction_id.as_deref(), Some("GW0042"));
    assert!(payment.paid_at.is_some());
}

#[tokio::test]
async fn callback_arrives_as_post_form_body_too() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    app.sign_callback(&mut params);

    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/payments/gateway/ipn",
            None,
            &[("content-type", "application/x-www-form-urlencoded")],
        )
        .await;
    // Empty body falls back to the (empty) query string and is a signature miss
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["RspCode"], "99");

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/gateway/ipn")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(axum::body::Body::from(to_query(&params)))
        .unwrap();
    let response = tower::ServiceExt::oneshot(
        courier_api::app_router(app.state.clone()),
        request,
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["RspCode"], "00");
}

#[tokio::test]
async fn tampered_signature_is_rejected_and_state_is_frozen() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    app.sign_callback(&mut params);
    params.insert("vnp_Amount".to_string(), "99900000".to_string());

    let body = send_ipn(&app, &params).await;
    assert_eq!(body["RspCode"], "97");

    let refreshed = fetch_order(&app, &order).await;
    assert_eq!(refreshed["status"], "pending");
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let params = success_params(&order);
    let body = send_ipn(&app, &params).await;
    assert_eq!(body["RspCode"], "99");
}

#[tokio::test]
async fn signed_amount_mismatch_is_rejected() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    params.insert("vnp_Amount".to_string(), "17000000".to_string());
    app.sign_callback(&mut params);

    let body = send_ipn(&app, &params).await;
    assert_eq!(body["RspCode"], "04");

    let refreshed = fetch_order(&app, &order).await;
    assert_eq!(refreshed["status"], "pending");
}

#[tokio::test]
async fn unknown_transaction_reference_is_rejected() {
    let app = TestApp::new().await;
    create_paid_for_order(&app).await;

    let mut params = BTreeMap::new();
    params.insert("vnp_TxnRef".to_string(), "VC999999999VN".to_string());
    params.insert("vnp_Amount".to_string(), "18000000".to_string());
    params.insert("vnp_ResponseCode".to_string(), "00".to_string());
    app.sign_callback(&mut params);

    let body = send_ipn(&app, &params).await;
    assert_eq!(body["RspCode"], "01");
}

#[tokio::test]
async fn duplicate_callback_is_absorbed_idempotently() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    app.sign_callback(&mut params);

    let first = send_ipn(&app, &params).await;
    assert_eq!(first["RspCode"], "00");

    let second = send_ipn(&app, &params).await;
    assert_eq!(second["RspCode"], "02");

    // Exactly one confirmation landed on the order
    let refreshed = fetch_order(&app, &order).await;
    assert_eq!(refreshed["status"], "confirmed");

    let waybill = order["waybill"].as_str().unwrap();
    let response = app
        .request(Method::GET, &format!("/api/v1/tracking/{waybill}"), None)
        .await;
    let timeline = body_json(response).await;
    let confirmations = timeline["data"]["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["status"] == "confirmed")
        .count();
    assert_eq!(confirmations, 1);
}

#[tokio::test]
async fn concurrent_identical_callbacks_apply_exactly_once() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    app.sign_callback(&mut params);

    let (first, second) = tokio::join!(send_ipn(&app, &params), send_ipn(&app, &params));

    let mut codes = vec![
        first["RspCode"].as_str().unwrap().to_string(),
        second["RspCode"].as_str().unwrap().to_string(),
    ];
    codes.sort();
    assert_eq!(codes, vec!["00", "02"]);

    let refreshed = fetch_order(&app, &order).await;
    assert_eq!(refreshed["status"], "confirmed");
}

#[tokio::test]
async fn failed_charge_is_recorded_without_confirming_the_order() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;

    let mut params = success_params(&order);
    params.insert("vnp_ResponseCode".to_string(), "24".to_string());
    params.insert("vnp_TransactionStatus".to_string(), "02".to_string());
    app.sign_callback(&mut params);

    // A verified failure is still a successfully received callback
    let body = send_ipn(&app, &params).await;
    assert_eq!(body["RspCode"], "00");

    let refreshed = fetch_order(&app, &order).await;
    assert_eq!(refreshed["status"], "pending");

    let payment = app
        .state
        .services
        .payments
        .latest_payment(Uuid::parse_str(order["id"].as_str().unwrap()).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, "failed");
    assert_eq!(payment.gateway_response_code.as_deref(), Some("24"));
    assert!(payment.paid_at.is_none());
}

#[tokio::test]
async fn infrastructure_failure_still_answers_the_gateway_contract() {
    // A connected pool with no schema behind it: signature verification
    // passes, then every database lookup fails.
    let mut cfg = courier_api::config::AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_081,
        "test".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.gateway.secret_key = "test_gateway_secret".to_string();

    let pool = courier_api::db::establish_connection_from_app_config(&cfg)
        .await
        .unwrap();
    let (event_sender, event_rx) = courier_api::events::channel(8);
    let event_task = tokio::spawn(courier_api::events::process_events(event_rx));
    let state = courier_api::AppState::new(std::sync::Arc::new(pool), cfg, event_sender);

    let mut params = BTreeMap::new();
    params.insert("vnp_TxnRef".to_string(), "VC123456789VN".to_string());
    params.insert("vnp_Amount".to_string(), "18000000".to_string());
    params.insert("vnp_ResponseCode".to_string(), "00".to_string());
    let signature = state
        .services
        .payments
        .gateway()
        .sign(&courier_api::services::gateway::canonical_query(&params));
    params.insert("vnp_SecureHash".to_string(), signature);

    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri(format!("/api/v1/payments/gateway/ipn?{}", to_query(&params)))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(courier_api::app_router(state), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["RspCode"], "99");
    assert_eq!(body["Message"], "Unknown error");

    event_task.abort();
}

#[tokio::test]
async fn payment_initiation_requires_a_pending_order() {
    let app = TestApp::new().await;
    let order = create_paid_for_order(&app).await;
    let id = order["id"].as_str().unwrap();

    // Confirm via a valid callback first
    let mut params = success_params(&order);
    app.sign_callback(&mut params);
    send_ipn(&app, &params).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments",
            Some(json!({ "order_id": id, "method": "gateway" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
