use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use courier_api::{
    config::AppConfig,
    db,
    entities::pricing_record,
    events,
    services::gateway::{canonical_query, PARAM_SECURE_HASH},
    AppState,
};

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _tmp: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let db_path = tmp.path().join("courier_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.gateway.secret_key = "test_gateway_secret".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db_arc, cfg, event_sender);
        let router = courier_api::app_router(state.clone());

        Self {
            router,
            state,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    /// Send a JSON request against the router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seed one active catalog record for a fresh service tier and return its
    /// tier ID.
    pub async fn seed_pricing_record(
        &self,
        base_price: Decimal,
        overweight_threshold_kg: Decimal,
        overweight_fee: Decimal,
        cross_region_fee: Decimal,
    ) -> Uuid {
        let service_tier_id = Uuid::new_v4();
        let now = Utc::now();

        pricing_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            service_tier_id: Set(service_tier_id),
            base_price: Set(base_price),
            overweight_threshold_kg: Set(overweight_threshold_kg),
            overweight_fee: Set(overweight_fee),
            cross_region_fee: Set(cross_region_fee),
            is_active: Set(true),
            effective_from: Set(now - Duration::days(1)),
            effective_to: Set(None),
            is_deleted: Set(false),
            deleted_at: Set(None),
            deleted_by: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed pricing record");

        service_tier_id
    }

    /// Sign a gateway callback parameter set with the test secret.
    pub fn sign_callback(&self, params: &mut BTreeMap<String, String>) {
        let gateway = self.state.services.payments.gateway();
        let signature = gateway.sign(&canonical_query(params));
        params.insert(PARAM_SECURE_HASH.to_string(), signature);
    }
}

/// Decode a response body into JSON.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

/// Render a callback parameter map as a query string for the IPN endpoint.
pub fn to_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| {
            let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
            format!("{k}={encoded}")
        })
        .collect::<Vec<_>>()
        .join("&")
}
