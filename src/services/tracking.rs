use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::tracking_event::{
        self, ActiveModel as TrackingEventActiveModel, Entity as TrackingEventEntity,
        Model as TrackingEventModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Status vocabulary of the tracking timeline: the order lifecycle states plus
/// physical-progress sub-states reported by branches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Created,
    Accepted,
    OutForDelivery,
    Returned,
    Confirmed,
    Shipping,
    Completed,
    Canceled,
}

/// Optional context recorded alongside a tracking event.
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppendMeta {
    pub location: Option<String>,
    pub branch_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_by: Option<String>,
}

/// Inserts one tracking event. Generic over the connection so order and
/// payment writes can append within their own transactions.
pub async fn record<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: TrackingStatus,
    meta: AppendMeta,
) -> Result<TrackingEventModel, ServiceError> {
    let now = Utc::now();
    let event = TrackingEventActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status.to_string()),
        location: Set(meta.location),
        branch_id: Set(meta.branch_id),
        note: Set(meta.note),
        created_by: Set(meta.created_by),
        timestamp: Set(now),
        created_at: Set(now),
    };

    Ok(event.insert(conn).await?)
}

/// Read/append access to the per-order tracking timeline. Events are
/// append-only: there is no update or delete path.
#[derive(Clone)]
pub struct TrackingService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl TrackingService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Appends a tracking event outside any caller-owned transaction
    /// (branch scan updates, manual corrections as new events).
    #[instrument(skip(self, meta), fields(order_id = %order_id, status = %status))]
    pub async fn append(
        &self,
        order_id: Uuid,
        status: TrackingStatus,
        meta: AppendMeta,
    ) -> Result<TrackingEventModel, ServiceError> {
        let event = record(&*self.db_pool, order_id, status, meta).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::TrackingEventRecorded {
                order_id,
                status: event.status.clone(),
            })
            .await
        {
            warn!(order_id = %order_id, error = %e, "Failed to send tracking event recorded event");
        }

        Ok(event)
    }

    /// Full timeline for an order, ascending by timestamp. Each call is a
    /// fresh read; no cursor state is retained.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<TrackingEventModel>, ServiceError> {
        let events = TrackingEventEntity::find()
            .filter(tracking_event::Column::OrderId.eq(order_id))
            .order_by_asc(tracking_event::Column::Timestamp)
            .order_by_asc(tracking_event::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;

        Ok(events)
    }

    /// Latest event for an order, the timeline's notion of current status.
    pub async fn latest(&self, order_id: Uuid) -> Result<Option<TrackingEventModel>, ServiceError> {
        let event = TrackingEventEntity::find()
            .filter(tracking_event::Column::OrderId.eq(order_id))
            .order_by_desc(tracking_event::Column::Timestamp)
            .order_by_desc(tracking_event::Column::CreatedAt)
            .one(&*self.db_pool)
            .await?;

        Ok(event)
    }
}
