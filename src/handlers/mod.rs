pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod quotes;
pub mod tracking;

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::gateway::GatewayClient;
use crate::services::orders::OrderService;
use crate::services::payments::PaymentService;
use crate::services::pricing::PricingService;
use crate::services::tracking::TrackingService;

pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub pricing: Arc<PricingService>,
    pub orders: Arc<OrderService>,
    pub tracking: Arc<TrackingService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        gateway_config: GatewayConfig,
    ) -> Self {
        let pricing = PricingService::new(db_pool.clone());
        let orders = Arc::new(OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
            pricing.clone(),
        ));
        let payments = Arc::new(PaymentService::new(
            db_pool.clone(),
            event_sender.clone(),
            GatewayClient::new(gateway_config),
            orders.clone(),
        ));

        Self {
            pricing: Arc::new(pricing),
            orders,
            tracking: Arc::new(TrackingService::new(db_pool, event_sender)),
            payments,
        }
    }
}
