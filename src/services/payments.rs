use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    entities::payment::{
        self, ActiveModel as PaymentActiveModel, Entity as PaymentEntity, Model as PaymentModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{
        self, GatewayClient, SignatureCheck, GATEWAY_SUCCESS_CODE, PARAM_AMOUNT,
        PARAM_RESPONSE_CODE, PARAM_TRANSACTION_NO, PARAM_TRANSACTION_STATUS, PARAM_TXN_REF,
    },
    services::orders::{OrderService, OrderStatus},
};

/// Payment attempt states. `paid` and `failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }
}

/// Payment method for the externally-redirected gateway flow.
pub const METHOD_GATEWAY: &str = "gateway";
/// Cash on delivery, settled by the courier at the door.
pub const METHOD_COD: &str = "cod";

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,

    #[validate(length(min = 1, max = 32, message = "Payment method is required"))]
    pub method: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: rust_decimal::Decimal,
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub gateway_response_code: Option<String>,
    pub paid_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
    /// Signed hosted-payment URL, present for gateway-redirected methods.
    pub redirect_url: Option<String>,
}

/// Outcome of reconciling one inbound gateway callback. Every variant maps to
/// the response-code contract the gateway expects; none of them is surfaced as
/// an HTTP error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Verified and applied; `paid` tells whether the gateway reported success.
    Applied { paid: bool },
    /// Idempotent replay or lost conditional update; no side effect.
    AlreadyProcessed,
    OrderNotFound,
    AmountMismatch,
    InvalidSignature,
    MissingSignature,
}

impl CallbackOutcome {
    pub fn rsp_code(self) -> &'static str {
        match self {
            CallbackOutcome::Applied { .. } => gateway::rsp::SUCCESS,
            CallbackOutcome::AlreadyProcessed => gateway::rsp::ALREADY_CONFIRMED,
            CallbackOutcome::OrderNotFound => gateway::rsp::ORDER_NOT_FOUND,
            CallbackOutcome::AmountMismatch => gateway::rsp::AMOUNT_MISMATCH,
            CallbackOutcome::InvalidSignature => gateway::rsp::INVALID_SIGNATURE,
            CallbackOutcome::MissingSignature => gateway::rsp::MISSING_SIGNATURE,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CallbackOutcome::Applied { .. } => "Confirm Success",
            CallbackOutcome::AlreadyProcessed => "Order already confirmed",
            CallbackOutcome::OrderNotFound => "Order not found",
            CallbackOutcome::AmountMismatch => "Invalid amount",
            CallbackOutcome::InvalidSignature => "Invalid signature",
            CallbackOutcome::MissingSignature => "Missing signature",
        }
    }
}

/// Verifies and applies external gateway callbacks against payment and order
/// records, idempotently.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    gateway: GatewayClient,
    orders: Arc<OrderService>,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        gateway: GatewayClient,
        orders: Arc<OrderService>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
            orders,
        }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Creates a pending payment attempt for a payable order. For the
    /// gateway-redirected method the response carries the signed redirect URL.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, method = %request.method))]
    pub async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentResponse, ServiceError> {
        request.validate()?;

        let order = self.load_order(request.order_id).await?;
        let order_status = crate::services::orders::parse_status(&order.status)?;
        if order_status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is not payable in status '{}'",
                order.id, order_status
            )));
        }

        let now = Utc::now();
        let payment_id = Uuid::new_v4();

        let payment = PaymentActiveModel {
            id: Set(payment_id),
            order_id: Set(order.id),
            amount: Set(order.total_order_value),
            method: Set(request.method.clone()),
            status: Set(PaymentStatus::Pending.to_string()),
            transaction_id: Set(None),
            gateway_response_code: Set(None),
            paid_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(&*self.db_pool)
        .await?;

        let redirect_url = if request.method == METHOD_GATEWAY {
            Some(self.gateway.build_redirect_url(
                &order.waybill,
                order.total_order_value,
                &format!("Payment for shipment {}", order.waybill),
                now,
            )?)
        } else {
            None
        };

        info!(payment_id = %payment_id, order_id = %order.id, "Payment initiated");

        if let Err(e) = self
            .event_sender
            .send(Event::PaymentInitiated(payment_id))
            .await
        {
            warn!(payment_id = %payment_id, error = %e, "Failed to send payment initiated event");
        }

        self.model_to_response(payment, redirect_url)
    }

    /// Verifies an inbound gateway callback and applies it at most once.
    ///
    /// Duplicate or racing callbacks for the same transaction reference are
    /// absorbed by the status-guarded update: only one caller flips the
    /// payment out of `pending`, everyone else observes `AlreadyProcessed`.
    #[instrument(skip(self, params))]
    pub async fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, ServiceError> {
        let txn_ref = params
            .get(PARAM_TXN_REF)
            .cloned()
            .unwrap_or_else(|| "<missing>".to_string());

        match self.gateway.check_signature(params) {
            SignatureCheck::Missing => {
                warn!(txn_ref = %txn_ref, "Callback rejected: missing signature");
                return Ok(CallbackOutcome::MissingSignature);
            }
            SignatureCheck::Invalid => {
                warn!(txn_ref = %txn_ref, "Callback rejected: invalid signature");
                return Ok(CallbackOutcome::InvalidSignature);
            }
            SignatureCheck::Valid => {}
        }

        // Archived orders stay resolvable here: money movement must reconcile
        // even after staff archival.
        let order = match self.find_order_by_waybill(&txn_ref).await? {
            Some(order) => order,
            None => {
                warn!(txn_ref = %txn_ref, "Callback rejected: order not found");
                return Ok(CallbackOutcome::OrderNotFound);
            }
        };

        let callback_amount = params
            .get(PARAM_AMOUNT)
            .and_then(|raw| raw.parse::<i64>().ok());
        let expected_amount = gateway::to_gateway_amount(order.total_order_value);
        if callback_amount.is_none() || callback_amount != expected_amount {
            warn!(
                txn_ref = %txn_ref,
                callback_amount = ?callback_amount,
                expected_amount = ?expected_amount,
                "Callback rejected: amount mismatch"
            );
            return Ok(CallbackOutcome::AmountMismatch);
        }

        let payment = match self.latest_payment(order.id).await? {
            Some(payment) => payment,
            None => {
                warn!(txn_ref = %txn_ref, order_id = %order.id, "Callback for order with no payment attempt");
                return Ok(CallbackOutcome::OrderNotFound);
            }
        };

        let payment_status = parse_payment_status(&payment.status)?;
        if payment_status.is_terminal() {
            info!(txn_ref = %txn_ref, payment_id = %payment.id, "Callback replay, already processed");
            return Ok(CallbackOutcome::AlreadyProcessed);
        }

        let response_code = params
            .get(PARAM_RESPONSE_CODE)
            .cloned()
            .unwrap_or_default();
        let transaction_status = params
            .get(PARAM_TRANSACTION_STATUS)
            .cloned()
            .unwrap_or_else(|| GATEWAY_SUCCESS_CODE.to_string());
        let paid =
            response_code == GATEWAY_SUCCESS_CODE && transaction_status == GATEWAY_SUCCESS_CODE;
        let transaction_id = params.get(PARAM_TRANSACTION_NO).cloned();

        let new_status = if paid {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Failed
        };
        let now = Utc::now();

        // At-most-once: the flip only succeeds if the row is still pending.
        let mut update = PaymentEntity::update_many()
            .col_expr(payment::Column::Status, Expr::value(new_status.to_string()))
            .col_expr(
                payment::Column::TransactionId,
                Expr::value(transaction_id.clone()),
            )
            .col_expr(
                payment::Column::GatewayResponseCode,
                Expr::value(Some(response_code.clone())),
            )
            .col_expr(payment::Column::UpdatedAt, Expr::value(Some(now)));
        if paid {
            update = update.col_expr(payment::Column::PaidAt, Expr::value(Some(now)));
        }

        let result = update
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Status.eq(PaymentStatus::Pending.to_string()))
            .exec(&*self.db_pool)
            .await?;

        if result.rows_affected == 0 {
            info!(txn_ref = %txn_ref, payment_id = %payment.id, "Concurrent callback won the race");
            return Ok(CallbackOutcome::AlreadyProcessed);
        }

        if paid {
            info!(txn_ref = %txn_ref, payment_id = %payment.id, "Payment confirmed");

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentConfirmed {
                    payment_id: payment.id,
                    order_id: order.id,
                    transaction_id: transaction_id.clone(),
                })
                .await
            {
                warn!(payment_id = %payment.id, error = %e, "Failed to send payment confirmed event");
            }

            // Drive the order lifecycle. If a staff cancel slipped in between,
            // the payment record stands and the discrepancy is logged for
            // manual reconciliation.
            match self
                .orders
                .transition(
                    order.id,
                    OrderStatus::Confirmed,
                    Some("payment-gateway"),
                    Some(format!("Payment confirmed, gateway ref {txn_ref}")),
                )
                .await
            {
                Ok(_) => {}
                Err(ServiceError::InvalidOperation(msg))
                | Err(ServiceError::NotFound(msg)) => {
                    warn!(
                        txn_ref = %txn_ref,
                        order_id = %order.id,
                        reason = %msg,
                        "Paid payment could not confirm order, needs manual reconciliation"
                    );
                }
                Err(ServiceError::ConcurrentModification(id)) => {
                    warn!(
                        txn_ref = %txn_ref,
                        order_id = %id,
                        "Paid payment lost order transition race, needs manual reconciliation"
                    );
                }
                Err(e) => return Err(e),
            }
        } else {
            warn!(txn_ref = %txn_ref, payment_id = %payment.id, response_code = %response_code, "Payment failed");

            if let Err(e) = self
                .event_sender
                .send(Event::PaymentFailed {
                    payment_id: payment.id,
                    order_id: order.id,
                    response_code: response_code.clone(),
                })
                .await
            {
                warn!(payment_id = %payment.id, error = %e, "Failed to send payment failed event");
            }
        }

        Ok(CallbackOutcome::Applied { paid })
    }

    /// Latest payment attempt for an order.
    pub async fn latest_payment(
        &self,
        order_id: Uuid,
    ) -> Result<Option<PaymentModel>, ServiceError> {
        let payment = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db_pool)
            .await?;

        Ok(payment)
    }

    async fn load_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .filter(|o| !o.is_deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))
    }

    async fn find_order_by_waybill(
        &self,
        waybill: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::Waybill.eq(waybill))
            .one(&*self.db_pool)
            .await?;

        Ok(order)
    }

    fn model_to_response(
        &self,
        payment: PaymentModel,
        redirect_url: Option<String>,
    ) -> Result<PaymentResponse, ServiceError> {
        let status = parse_payment_status(&payment.status)?;

        Ok(PaymentResponse {
            id: payment.id,
            order_id: payment.order_id,
            amount: payment.amount,
            method: payment.method,
            status,
            transaction_id: payment.transaction_id,
            gateway_response_code: payment.gateway_response_code,
            paid_at: payment.paid_at,
            created_at: payment.created_at,
            redirect_url,
        })
    }
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, ServiceError> {
    raw.parse::<PaymentStatus>().map_err(|_| {
        ServiceError::InternalError(format!("Unknown payment status in storage: {raw}"))
    })
}
