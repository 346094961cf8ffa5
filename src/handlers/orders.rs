use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::orders::{CreateOrderRequest, OrderListResponse, OrderResponse};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery};

/// Staff identity for audit trails, taken from the `X-Actor` header.
const ACTOR_HEADER: &str = "x-actor";

fn actor_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub actor: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetOrderQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created with waybill and fee snapshot", body = crate::ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unclassifiable province or no active pricing", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let order = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number, 1-based"),
        ("limit" = Option<u64>, Query, description = "Page size"),
        ("include_archived" = Option<bool>, Query, description = "Include archived orders")
    ),
    responses(
        (status = 200, description = "Paginated order list, newest first", body = crate::ApiResponse<OrderListResponse>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let orders = state
        .services
        .orders
        .list_orders(query.page, query.limit, query.include_archived)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/:id",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
        ("include_archived" = Option<bool>, Query, description = "Include archived orders")
    ),
    responses(
        (status = 200, description = "Order details", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<GetOrderQuery>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(id, query.include_archived)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/:id/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Order transitioned", body = crate::ApiResponse<OrderResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Illegal transition or lost update race", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let target = crate::services::orders::parse_status(&request.status).map_err(|_| {
        ServiceError::InvalidInput(format!("Unknown order status: {}", request.status))
    })?;
    let actor = request.actor.or_else(|| actor_from_headers(&headers));

    let order = state
        .services
        .orders
        .transition(id, target, actor.as_deref(), request.note)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/:id",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order archived", body = crate::ApiResponse<serde_json::Value>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn archive_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let actor = actor_from_headers(&headers).unwrap_or_else(|| "api".to_string());
    state.services.orders.soft_delete(id, &actor).await?;
    Ok(Json(ApiResponse::success_with_message(
        serde_json::json!({ "id": id }),
        "Order archived",
    )))
}

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id", delete(archive_order))
        .route("/:id/status", post(update_order_status))
}
