use crate::{
    errors::ApiError,
    metrics::PRICE_LOOKUPS,
    models::{PriceQuote, ProductCode},
    AppState,
};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct PriceLookupQuery {
    pub product: String,
    pub quantity: String,
}

/// `GET /api/price-lookup?product=mini&quantity=12`
pub async fn price_lookup(
    State(state): State<AppState>,
    Query(query): Query<PriceLookupQuery>,
) -> Result<Json<PriceQuote>, ApiError> {
    let product = ProductCode::from_str(query.product.trim())
        .map_err(|_| ApiError::bad_request(format!("Unknown product: {}", query.product)))?;
    let quantity = query
        .quantity
        .trim()
        .parse::<u32>()
        .map_err(|_| ApiError::bad_request("Quantity must be a whole number"))?;

    let quote = state.services.pricing.lookup(product, quantity)?;
    PRICE_LOOKUPS.inc();
    Ok(Json(quote))
}
