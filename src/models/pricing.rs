use super::ProductCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A quantity band with its own unit price and payment-platform price id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub min_qty: u32,
    pub max_qty: u32,
    pub unit_price: Decimal,
    pub price_id: String,
}

impl PriceTier {
    pub fn contains(&self, quantity: u32) -> bool {
        (self.min_qty..=self.max_qty).contains(&quantity)
    }
}

/// Price-lookup result; its fields become the checkout page query string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub product: ProductCode,
    pub product_name: String,
    pub quantity: u32,
    pub price_id: String,
    pub unit_price: Decimal,
    pub checkout_url: String,
}
