use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Shipping block of a finalized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipping {
    pub name: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    pub description: String,
    pub quantity: u32,
    pub amount_total: Decimal,
}

/// Order details shown on the confirmation page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub amount_total: Decimal,
    pub currency: String,
    pub payment_status: String,
    pub shipping: Option<OrderShipping>,
    #[serde(default)]
    pub line_items: Vec<OrderLineItem>,
}
