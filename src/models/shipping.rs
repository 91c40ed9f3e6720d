use super::{Country, ProductCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of the latest shipping-cost lookup; replaced wholesale on every quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub cost: Option<Decimal>,
}

impl ShippingQuote {
    pub fn available(cost: Decimal) -> Self {
        Self { cost: Some(cost) }
    }

    pub fn unavailable() -> Self {
        Self { cost: None }
    }
}

/// Destination portion of a shipping-cost request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDestination {
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default)]
    pub country: Country,
}

/// `POST /api/shipping-cost` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuoteRequest {
    pub address: QuoteDestination,
    pub products: BTreeMap<ProductCode, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuoteResponse {
    pub cost: Decimal,
}
