pub mod order;
pub mod payment;
pub mod pricing_record;
pub mod tracking_event;
