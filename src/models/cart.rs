use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Smallest orderable quantity.
pub const MIN_QUANTITY: u32 = 1;
/// Largest quantity a single checkout may carry.
pub const MAX_QUANTITY: u32 = 500;

/// Products sold through the checkout.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProductCode {
    /// Compact drain-line flush and clean-out tool
    Mini,
    /// Drain-pan water sensor with float shut-off
    Sensor,
    /// Mini and Sensor packaged together
    Bundle,
}

impl ProductCode {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProductCode::Mini => "DrainLine Mini",
            ProductCode::Sensor => "DrainLine Sensor",
            ProductCode::Bundle => "DrainLine Mini + Sensor Bundle",
        }
    }
}

/// The product being purchased, parsed once from the checkout URL and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSelection {
    pub product: ProductCode,
    pub product_name: String,
    pub quantity: u32,
    pub price_id: String,
    pub unit_price: Decimal,
}

impl CartSelection {
    /// Display-only subtotal; the charged amount always comes from the payment platform.
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
