// Server-side checkout services
pub mod orders;
pub mod payment_intents;
pub mod pricing;
pub mod shipping;
pub mod stripe;
pub mod tax;
