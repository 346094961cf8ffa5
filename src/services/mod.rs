pub mod gateway;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod tracking;
pub mod zones;
