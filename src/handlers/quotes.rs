use axum::{extract::State, response::Json, routing::post, Router};

use crate::services::pricing::{FeeBreakdown, QuoteRequest};
use crate::{errors::ServiceError, ApiResponse, AppState};

#[utoipa::path(
    post,
    path = "/api/v1/quotes",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Fee breakdown for the requested route", body = crate::ApiResponse<FeeBreakdown>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unclassifiable province or no active pricing", body = crate::errors::ErrorResponse)
    ),
    tag = "Quotes"
)]
pub async fn create_quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<ApiResponse<FeeBreakdown>>, ServiceError> {
    let breakdown = state.services.pricing.quote(&request).await?;
    Ok(Json(ApiResponse::success(breakdown)))
}

pub fn quotes_routes() -> Router<AppState> {
    Router::new().route("/", post(create_quote))
}
