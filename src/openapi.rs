use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier API",
        version = "0.3.0",
        description = "Back-office API for a domestic courier: shipment pricing, order lifecycle, tracking timelines, and payment-gateway reconciliation."
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Quotes", description = "Shipment fee quoting"),
        (name = "Orders", description = "Order lifecycle management"),
        (name = "Payments", description = "Payment initiation and gateway callbacks"),
        (name = "Tracking", description = "Public shipment tracking"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::quotes::create_quote,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::archive_order,
        crate::handlers::payments::initiate_payment,
        crate::handlers::payment_webhooks::gateway_ipn,
        crate::handlers::tracking::get_timeline,
        crate::handlers::health::health,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::services::zones::Region,
        crate::services::pricing::QuoteRequest,
        crate::services::pricing::FeeBreakdown,
        crate::services::orders::OrderStatus,
        crate::services::orders::CreateOrderRequest,
        crate::services::orders::OrderResponse,
        crate::services::orders::OrderListResponse,
        crate::handlers::orders::UpdateStatusRequest,
        crate::services::payments::PaymentStatus,
        crate::services::payments::InitiatePaymentRequest,
        crate::services::payments::PaymentResponse,
        crate::handlers::payment_webhooks::IpnResponse,
        crate::handlers::tracking::TrackingEventView,
        crate::handlers::tracking::TrackingTimelineResponse,
        crate::handlers::health::HealthResponse,
    ))
)]
pub struct ApiDoc;

/// Serves the OpenAPI document as JSON.
pub async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
