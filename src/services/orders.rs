use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{FeeBreakdown, PricingService, QuoteRequest},
    services::tracking::{self, AppendMeta, TrackingStatus},
};

/// Order lifecycle states. The only legal edges are
/// pending -> confirmed -> shipping -> completed, with canceled reachable from
/// pending or confirmed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Completed,
    Canceled,
}

impl OrderStatus {
    /// Whether the edge `self -> target` exists in the lifecycle graph.
    /// Same-status requests are rejected like any other missing edge.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Confirmed, OrderStatus::Shipping)
                | (OrderStatus::Shipping, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Canceled)
                | (OrderStatus::Confirmed, OrderStatus::Canceled)
        )
    }

    /// Tracking-timeline mirror of this lifecycle state.
    pub fn tracking_status(self) -> TrackingStatus {
        match self {
            OrderStatus::Pending => TrackingStatus::Created,
            OrderStatus::Confirmed => TrackingStatus::Confirmed,
            OrderStatus::Shipping => TrackingStatus::Shipping,
            OrderStatus::Completed => TrackingStatus::Completed,
            OrderStatus::Canceled => TrackingStatus::Canceled,
        }
    }
}

static WAYBILL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[0-9]{9}[A-Z]{2}$").expect("valid waybill pattern"));

const WAYBILL_PREFIX: &str = "VC";
const WAYBILL_SUFFIX: &str = "VN";
const WAYBILL_MAX_ATTEMPTS: u32 = 5;

/// Validates the customer-facing waybill shape.
pub fn is_valid_waybill(waybill: &str) -> bool {
    WAYBILL_RE.is_match(waybill)
}

fn generate_waybill() -> String {
    let serial: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{WAYBILL_PREFIX}{serial:09}{WAYBILL_SUFFIX}")
}

/// Request/Response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "Sender name is required"))]
    pub sender_name: String,

    #[validate(length(min = 1, max = 100, message = "Receiver name is required"))]
    pub receiver_name: String,

    #[validate(length(min = 6, max = 20, message = "Receiver phone is required"))]
    pub receiver_phone: String,

    #[validate(length(min = 1, message = "Pickup address is required"))]
    pub pickup_address: String,

    #[validate(length(min = 1, message = "Delivery address is required"))]
    pub delivery_address: String,

    #[validate(length(min = 1, max = 8, message = "Origin province code is required"))]
    pub origin_province: String,

    #[validate(length(min = 1, max = 8, message = "Destination province code is required"))]
    pub dest_province: String,

    pub service_tier_id: Uuid,
    pub weight_kg: Decimal,

    #[serde(default)]
    pub cod_value: Decimal,

    pub payment_method: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub waybill: String,
    pub sender_name: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub origin_province: String,
    pub dest_province: String,
    pub service_tier_id: Uuid,
    pub weight_kg: Decimal,
    pub cod_value: Decimal,
    pub status: OrderStatus,
    pub snapshot_pricing_id: Uuid,
    pub breakdown: FeeBreakdown,
    pub shipping_fee: Decimal,
    pub total_order_value: Decimal,
    pub payment_method: Option<String>,
    pub delivered_at: Option<chrono::DateTime<Utc>>,
    pub is_archived: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Owns order creation, the lifecycle state machine, and waybill assignment.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    pricing: PricingService,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, pricing: PricingService) -> Self {
        Self {
            db_pool,
            event_sender,
            pricing,
        }
    }

    /// Creates a new order: validates input, snapshots the fee computation,
    /// assigns a fresh waybill (bounded collision retry), and seeds the
    /// tracking timeline, all in one transaction.
    #[instrument(skip(self, request), fields(origin = %request.origin_province, dest = %request.dest_province))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;

        if request.cod_value < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "COD value must not be negative, got {}",
                request.cod_value
            )));
        }

        // Fee snapshot is computed once, here; it is never recomputed for a
        // placed order.
        let breakdown = self
            .pricing
            .quote(&QuoteRequest {
                service_tier_id: request.service_tier_id,
                origin_province: request.origin_province.clone(),
                dest_province: request.dest_province.clone(),
                weight_kg: request.weight_kg,
                as_of: None,
            })
            .await?;

        let shipping_fee = breakdown.total_price;
        let total_order_value = request.cod_value + shipping_fee;
        let breakdown_json = serde_json::to_value(&breakdown)?;

        let mut last_err: Option<ServiceError> = None;
        for attempt in 1..=WAYBILL_MAX_ATTEMPTS {
            let waybill = generate_waybill();
            debug_assert!(is_valid_waybill(&waybill));

            match self
                .insert_order(&request, &waybill, &breakdown, &breakdown_json, shipping_fee, total_order_value)
                .await
            {
                Ok(order) => {
                    info!(order_id = %order.id, waybill = %order.waybill, "Order created");

                    if let Err(e) = self.event_sender.send(Event::OrderCreated(order.id)).await {
                        warn!(order_id = %order.id, error = %e, "Failed to send order created event");
                    }

                    return self.model_to_response(order);
                }
                Err(ServiceError::DatabaseError(db_err))
                    if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    warn!(attempt, waybill = %waybill, "Waybill collision, regenerating");
                    last_err = Some(ServiceError::DatabaseError(db_err));
                }
                Err(e) => return Err(e),
            }
        }

        error!("Exhausted waybill generation attempts");
        Err(last_err.unwrap_or_else(|| {
            ServiceError::Conflict("Could not assign a unique waybill".to_string())
        }))
    }

    async fn insert_order(
        &self,
        request: &CreateOrderRequest,
        waybill: &str,
        breakdown: &FeeBreakdown,
        breakdown_json: &serde_json::Value,
        shipping_fee: Decimal,
        total_order_value: Decimal,
    ) -> Result<OrderModel, ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await?;

        let order_active_model = OrderActiveModel {
            id: Set(order_id),
            waybill: Set(waybill.to_string()),
            sender_name: Set(request.sender_name.clone()),
            receiver_name: Set(request.receiver_name.clone()),
            receiver_phone: Set(request.receiver_phone.clone()),
            pickup_address: Set(request.pickup_address.clone()),
            delivery_address: Set(request.delivery_address.clone()),
            origin_province: Set(request.origin_province.trim().to_ascii_uppercase()),
            dest_province: Set(request.dest_province.trim().to_ascii_uppercase()),
            service_tier_id: Set(request.service_tier_id),
            weight_kg: Set(request.weight_kg),
            cod_value: Set(request.cod_value),
            status: Set(OrderStatus::Pending.to_string()),
            snapshot_pricing_id: Set(breakdown.pricing_record_id),
            snapshot_breakdown: Set(breakdown_json.clone()),
            shipping_fee: Set(shipping_fee),
            total_order_value: Set(total_order_value),
            payment_method: Set(request.payment_method.clone()),
            delivered_at: Set(None),
            is_deleted: Set(false),
            deleted_at: Set(None),
            deleted_by: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        let order = order_active_model.insert(&txn).await?;

        tracking::record(
            &txn,
            order_id,
            TrackingStatus::Created,
            AppendMeta {
                note: Some("Order created".to_string()),
                created_by: request.created_by.clone(),
                ..Default::default()
            },
        )
        .await?;

        txn.commit().await?;

        Ok(order)
    }

    /// Applies one lifecycle transition with a conditional atomic update: the
    /// write succeeds only if the status is still the one we loaded. A
    /// concurrent winner leaves the loser with `ConcurrentModification`.
    #[instrument(skip(self), fields(order_id = %order_id, target = %target))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: Option<&str>,
        note: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let order = self.load_active_order(order_id).await?;
        let current = parse_status(&order.status)?;

        if !current.can_transition_to(target) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot transition order {order_id} from '{current}' to '{target}'"
            )));
        }

        let now = Utc::now();
        let txn = db.begin().await?;

        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(target.to_string()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)));
        if target == OrderStatus::Completed {
            update = update.col_expr(order::Column::DeliveredAt, Expr::value(Some(now)));
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.to_string()))
            .filter(order::Column::IsDeleted.eq(false))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            // Someone else moved the order first; leave it unchanged.
            warn!(order_id = %order_id, "Lost transition race");
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        let audit_note = note.unwrap_or_else(|| {
            format!(
                "Status changed from '{current}' to '{target}'{}",
                actor.map(|a| format!(" by {a}")).unwrap_or_default()
            )
        });

        tracking::record(
            &txn,
            order_id,
            target.tracking_status(),
            AppendMeta {
                note: Some(audit_note),
                created_by: actor.map(str::to_string),
                ..Default::default()
            },
        )
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, from = %current, to = %target, "Order status updated");

        if let Err(e) = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: target.to_string(),
            })
            .await
        {
            warn!(order_id = %order_id, error = %e, "Failed to send status change event");
        }

        let updated = self.load_active_order(order_id).await?;
        self.model_to_response(updated)
    }

    /// Archives an order: sets the tombstone triple, leaves `status` alone.
    /// Allowed regardless of lifecycle state; repeated calls are no-ops.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn soft_delete(&self, order_id: Uuid, actor: &str) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let result = OrderEntity::update_many()
            .col_expr(order::Column::IsDeleted, Expr::value(true))
            .col_expr(order::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(order::Column::DeletedBy, Expr::value(Some(actor.to_string())))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsDeleted.eq(false))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish "absent" from "already archived"
            let exists = OrderEntity::find_by_id(order_id).one(db).await?.is_some();
            if !exists {
                return Err(ServiceError::NotFound(format!(
                    "Order {order_id} not found"
                )));
            }
            info!(order_id = %order_id, "Order already archived");
            return Ok(());
        }

        info!(order_id = %order_id, actor = %actor, "Order archived");

        if let Err(e) = self.event_sender.send(Event::OrderArchived(order_id)).await {
            warn!(order_id = %order_id, error = %e, "Failed to send order archived event");
        }

        Ok(())
    }

    /// Retrieves an order by ID. Archived orders are hidden unless requested.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        include_archived: bool,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .filter(|o| include_archived || !o.is_deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        self.model_to_response(order)
    }

    /// Resolves an order by waybill. Archived orders are hidden unless requested.
    #[instrument(skip(self))]
    pub async fn find_by_waybill(
        &self,
        waybill: &str,
        include_archived: bool,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::Waybill.eq(waybill))
            .one(&*self.db_pool)
            .await?
            .filter(|o| include_archived || !o.is_deleted);

        Ok(order)
    }

    /// Lists orders with pagination, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        include_archived: bool,
    ) -> Result<OrderListResponse, ServiceError> {
        let mut query = OrderEntity::find();
        if !include_archived {
            query = query.filter(order::Column::IsDeleted.eq(false));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db_pool, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let orders = orders
            .into_iter()
            .map(|o| self.model_to_response(o))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    async fn load_active_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .filter(|o| !o.is_deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    fn model_to_response(&self, order: OrderModel) -> Result<OrderResponse, ServiceError> {
        let status = parse_status(&order.status)?;
        let breakdown: FeeBreakdown = serde_json::from_value(order.snapshot_breakdown)?;

        Ok(OrderResponse {
            id: order.id,
            waybill: order.waybill,
            sender_name: order.sender_name,
            receiver_name: order.receiver_name,
            receiver_phone: order.receiver_phone,
            pickup_address: order.pickup_address,
            delivery_address: order.delivery_address,
            origin_province: order.origin_province,
            dest_province: order.dest_province,
            service_tier_id: order.service_tier_id,
            weight_kg: order.weight_kg,
            cod_value: order.cod_value,
            status,
            snapshot_pricing_id: order.snapshot_pricing_id,
            breakdown,
            shipping_fee: order.shipping_fee,
            total_order_value: order.total_order_value,
            payment_method: order.payment_method,
            delivered_at: order.delivered_at,
            is_archived: order.is_deleted,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }
}

/// Parses a stored status column value.
pub fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    raw.parse::<OrderStatus>().map_err(|_| {
        ServiceError::InternalError(format!("Unknown order status in storage: {raw}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_graph_has_exactly_five_edges() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipping));
        assert!(Shipping.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Confirmed.can_transition_to(Canceled));

        // Skipping states is rejected
        assert!(!Pending.can_transition_to(Shipping));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Completed));

        // Cancel is only reachable early
        assert!(!Shipping.can_transition_to(Canceled));

        // Same-status requests are not edges
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Confirmed));
    }

    #[test]
    fn terminal_states_admit_no_transition() {
        use OrderStatus::*;

        for target in [Pending, Confirmed, Shipping, Completed, Canceled] {
            assert!(!Completed.can_transition_to(target), "completed -> {target}");
            assert!(!Canceled.can_transition_to(target), "canceled -> {target}");
        }
    }

    #[test]
    fn generated_waybills_match_the_public_format() {
        for _ in 0..100 {
            let waybill = generate_waybill();
            assert!(is_valid_waybill(&waybill), "bad waybill {waybill}");
        }
    }

    #[test]
    fn waybill_validation_rejects_malformed_input() {
        assert!(is_valid_waybill("VC123456789VN"));
        assert!(!is_valid_waybill("VC12345678VN")); // eight digits
        assert!(!is_valid_waybill("vc123456789vn")); // lowercase
        assert!(!is_valid_waybill("VC123456789V")); // short suffix
        assert!(!is_valid_waybill(""));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipping,
            OrderStatus::Completed,
            OrderStatus::Canceled,
        ] {
            assert_eq!(parse_status(&status.to_string()).unwrap(), status);
        }
        assert!(parse_status("nonsense").is_err());
    }
}
