use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shipping order. The fee breakdown computed at creation time is frozen into
/// `snapshot_breakdown`; later catalog changes never alter a placed order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Customer-facing shipment identifier, immutable once assigned.
    #[sea_orm(unique)]
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

    pub status: String,

    pub snapshot_pricing_id: Uuid,
    pub snapshot_breakdown: Json,
    pub shipping_fee: Decimal,
    pub total_order_value: Decimal,

    pub payment_method: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,

    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    #[sea_orm(has_many = "super::tracking_event::Entity")]
    TrackingEvents,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::tracking_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrackingEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
