use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::entities::tracking_event::Model as TrackingEventModel;
use crate::services::orders;
use crate::{errors::ServiceError, ApiResponse, AppState};

/// One event in the customer-facing timeline. Staff attribution stays internal.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingEventView {
    pub status: String,
    pub location: Option<String>,
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<TrackingEventModel> for TrackingEventView {
    fn from(event: TrackingEventModel) -> Self {
        Self {
            status: event.status,
            location: event.location,
            note: event.note,
            timestamp: event.timestamp,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingTimelineResponse {
    pub waybill: String,
    pub order_status: String,
    /// Status of the most recent timeline event.
    pub current_status: String,
    pub origin_province: String,
    pub dest_province: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub events: Vec<TrackingEventView>,
}

#[utoipa::path(
    get,
    path = "/api/v1/tracking/:waybill",
    params(("waybill" = String, Path, description = "Waybill, e.g. VC123456789VN")),
    responses(
        (status = 200, description = "Tracking timeline, oldest first", body = crate::ApiResponse<TrackingTimelineResponse>),
        (status = 400, description = "Malformed waybill", body = crate::errors::ErrorResponse),
        (status = 404, description = "No shipment for this waybill", body = crate::errors::ErrorResponse)
    ),
    tag = "Tracking"
)]
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(waybill): Path<String>,
) -> Result<Json<ApiResponse<TrackingTimelineResponse>>, ServiceError> {
    let waybill = waybill.trim().to_ascii_uppercase();
    if !orders::is_valid_waybill(&waybill) {
        return Err(ServiceError::InvalidInput(format!(
            "Malformed waybill: {waybill}"
        )));
    }

    // Archived orders disappear from the public surface.
    let order = state
        .services
        .orders
        .find_by_waybill(&waybill, false)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("No shipment for waybill {waybill}")))?;

    let events = state.services.tracking.list_by_order(order.id).await?;
    let current_status = state
        .services
        .tracking
        .latest(order.id)
        .await?
        .map(|e| e.status)
        .unwrap_or_else(|| order.status.clone());

    Ok(Json(ApiResponse::success(TrackingTimelineResponse {
        waybill: order.waybill,
        order_status: order.status,
        current_status,
        origin_province: order.origin_province,
        dest_province: order.dest_province,
        delivered_at: order.delivered_at,
        events: events.into_iter().map(TrackingEventView::from).collect(),
    })))
}

pub fn tracking_routes() -> Router<AppState> {
    Router::new().route("/:waybill", get(get_timeline))
}
