use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::pricing_record::{self, Entity as PricingRecordEntity, Model as PricingRecordModel},
    errors::ServiceError,
    services::zones::{self, Region},
};

/// Quote request for a shipment fee.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QuoteRequest {
    pub service_tier_id: Uuid,

    #[validate(length(min = 1, max = 8, message = "Origin province code is required"))]
    pub origin_province: String,

    #[validate(length(min = 1, max = 8, message = "Destination province code is required"))]
    pub dest_province: String,

    pub weight_kg: Decimal,

    /// Instant the catalog is evaluated at; defaults to now.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

/// Itemized pricing result. Persisted verbatim with the order so support staff
/// can audit how a historic fee was derived after catalog rates change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeeBreakdown {
    pub origin_region: Region,
    pub dest_region: Region,
    pub is_local: bool,
    pub pricing_record_id: Uuid,
    pub base_price: Decimal,
    pub overweight_fee: Decimal,
    pub region_fee: Decimal,
    pub total_price: Decimal,
}

/// Computes deterministic shipment fees from the versioned pricing catalog.
#[derive(Clone)]
pub struct PricingService {
    db_pool: Arc<DbPool>,
}

impl PricingService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Produces a fee breakdown for the given tier, route, and weight.
    #[instrument(skip(self, request), fields(service_tier_id = %request.service_tier_id))]
    pub async fn quote(&self, request: &QuoteRequest) -> Result<FeeBreakdown, ServiceError> {
        request.validate()?;

        if request.weight_kg <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Weight must be positive, got {}",
                request.weight_kg
            )));
        }

        let origin_region = zones::classify(&request.origin_province).ok_or_else(|| {
            ServiceError::BusinessRule(format!(
                "Unclassifiable origin province: {}",
                request.origin_province
            ))
        })?;
        let dest_region = zones::classify(&request.dest_province).ok_or_else(|| {
            ServiceError::BusinessRule(format!(
                "Unclassifiable destination province: {}",
                request.dest_province
            ))
        })?;

        let as_of = request.as_of.unwrap_or_else(Utc::now);
        let record = self
            .applicable_record(request.service_tier_id, as_of)
            .await?
            .ok_or_else(|| {
                ServiceError::BusinessRule(format!(
                    "No active pricing for service tier {} at {}",
                    request.service_tier_id, as_of
                ))
            })?;

        let is_local = normalized(&request.origin_province) == normalized(&request.dest_province);
        let breakdown = compute_breakdown(
            &record,
            origin_region,
            dest_region,
            is_local,
            request.weight_kg,
        );

        info!(
            pricing_record_id = %record.id,
            total_price = %breakdown.total_price,
            "Quote computed"
        );

        Ok(breakdown)
    }

    /// Selects the single catalog record applicable at `as_of`. Overlapping
    /// records resolve deterministically: latest effective_from wins, ties
    /// broken by most-recently-created.
    async fn applicable_record(
        &self,
        service_tier_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Option<PricingRecordModel>, ServiceError> {
        let record = PricingRecordEntity::find()
            .filter(pricing_record::Column::ServiceTierId.eq(service_tier_id))
            .filter(pricing_record::Column::IsDeleted.eq(false))
            .filter(pricing_record::Column::IsActive.eq(true))
            .filter(pricing_record::Column::EffectiveFrom.lte(as_of))
            .filter(
                Condition::any()
                    .add(pricing_record::Column::EffectiveTo.is_null())
                    .add(pricing_record::Column::EffectiveTo.gt(as_of)),
            )
            .order_by_desc(pricing_record::Column::EffectiveFrom)
            .order_by_desc(pricing_record::Column::CreatedAt)
            .one(&*self.db_pool)
            .await?;

        Ok(record)
    }
}

fn normalized(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Pure fee arithmetic over one catalog record. The overweight fee is a flat
/// add-on, not scaled by excess weight; the region surcharge applies only to
/// cross-region, non-local routes.
pub fn compute_breakdown(
    record: &PricingRecordModel,
    origin_region: Region,
    dest_region: Region,
    is_local: bool,
    weight_kg: Decimal,
) -> FeeBreakdown {
    let overweight_fee = if weight_kg > record.overweight_threshold_kg {
        record.overweight_fee
    } else {
        Decimal::ZERO
    };

    let region_fee = if origin_region != dest_region && !is_local {
        record.cross_region_fee
    } else {
        Decimal::ZERO
    };

    let total_price = record.base_price + overweight_fee + region_fee;

    FeeBreakdown {
        origin_region,
        dest_region,
        is_local,
        pricing_record_id: record.id,
        base_price: record.base_price,
        overweight_fee,
        region_fee,
        total_price,
    }
}
