use axum::{extract::State, http::StatusCode, response::Json, routing::post, Router};

use crate::services::payments::{InitiatePaymentRequest, PaymentResponse};
use crate::{errors::ServiceError, ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 201, description = "Payment attempt created, redirect URL included for gateway methods", body = crate::ApiResponse<PaymentResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not payable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let payment = state.services.payments.initiate_payment(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(initiate_payment))
        .merge(super::payment_webhooks::webhook_routes())
}
