mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use courier_api::events::{self, Event};
use courier_api::services::tracking::{AppendMeta, TrackingService, TrackingStatus};

use common::{body_json, TestApp};

async fn seeded_order(app: &TestApp) -> serde_json::Value {
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
                "weight_kg": "2"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

#[tokio::test]
async fn new_order_has_a_created_event() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let waybill = order["waybill"].as_str().unwrap();

    let response = app
        .request(Method::GET, &format!("/api/v1/tracking/{waybill}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["waybill"], order["waybill"]);
    assert_eq!(body["data"]["current_status"], "created");
    assert_eq!(body["data"]["origin_province"], "HN");
    assert_eq!(body["data"]["dest_province"], "HCM");

    let events = body["data"]["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["status"], "created");
}

#[tokio::test]
async fn branch_scan_append_emits_an_event() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let order_id = Uuid::parse_str(order["id"].as_str().unwrap()).unwrap();

    // Own channel so the emission is observable instead of drained by the
    // logger task.
    let (sender, mut rx) = events::channel(8);
    let tracking = TrackingService::new(app.state.db.clone(), sender);
    tracking
        .append(order_id, TrackingStatus::Accepted, AppendMeta::default())
        .await
        .unwrap();

    match rx.recv().await {
        Some(Event::TrackingEventRecorded { order_id: id, status }) => {
            assert_eq!(id, order_id);
            assert_eq!(status, "accepted");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn appended_event_becomes_the_current_status() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let order_id = Uuid::parse_str(order["id"].as_str().unwrap()).unwrap();
    let waybill = order["waybill"].as_str().unwrap();

    app.state
        .services
        .tracking
        .append(
            order_id,
            TrackingStatus::Accepted,
            AppendMeta {
                location: Some("Hoan Kiem branch".to_string()),
                ..AppendMeta::default()
            },
        )
        .await
        .unwrap();

    let latest = app
        .state
        .services
        .tracking
        .latest(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.status, "accepted");

    let response = app
        .request(Method::GET, &format!("/api/v1/tracking/{waybill}"), None)
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["current_status"], "accepted");
    // The order itself has not transitioned; only the timeline moved.
    assert_eq!(body["data"]["order_status"], "pending");
    assert_eq!(body["data"]["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn lookup_is_case_insensitive_on_the_waybill() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let lowered = order["waybill"].as_str().unwrap().to_ascii_lowercase();

    let response = app
        .request(Method::GET, &format!("/api/v1/tracking/{lowered}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_waybill_is_a_bad_request() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/tracking/NOT-A-WAYBILL", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn well_formed_unknown_waybill_is_not_found() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/tracking/VC000000000VN", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn archived_orders_are_untrackable() {
    let app = TestApp::new().await;
    let order = seeded_order(&app).await;
    let id = order["id"].as_str().unwrap();
    let waybill = order["waybill"].as_str().unwrap();

    let response = app
        .request(Method::DELETE, &format!("/api/v1/orders/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, &format!("/api/v1/tracking/{waybill}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
