use crate::{
    middleware_helpers::sanitize::{sanitize_number, sanitize_string},
    models::{CartSelection, ProductCode, MAX_QUANTITY, MIN_QUANTITY},
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashMap, str::FromStr};

/// Where a shopper lands when the checkout link is unusable
pub const CATALOG_PATH: &str = "/products";

const MAX_UNIT_PRICE: Decimal = dec!(10000);

static PRICE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^price_[A-Za-z0-9_]+$").expect("static regex"));

/// Why a checkout link was rejected. Every variant redirects to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartParamError {
    #[error("missing parameter: {0}")]
    Missing(&'static str),

    #[error("unknown product: {0}")]
    UnknownProduct(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid price id: {0}")]
    InvalidPriceId(String),

    #[error("invalid unit price: {0}")]
    InvalidUnitPrice(String),
}

impl CartParamError {
    pub fn redirect(&self) -> &'static str {
        CATALOG_PATH
    }
}

/// Parses a raw query string (with or without the leading `?`).
pub fn parse_cart_query(query: &str) -> Result<CartSelection, CartParamError> {
    let params: HashMap<String, String> =
        url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect();
    parse_cart(&params)
}

pub fn parse_cart(params: &HashMap<String, String>) -> Result<CartSelection, CartParamError> {
    let get = |key: &'static str| {
        params
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or(CartParamError::Missing(key))
    };

    let raw_product = get("product")?;
    let product = ProductCode::from_str(raw_product)
        .map_err(|_| CartParamError::UnknownProduct(raw_product.to_string()))?;

    let raw_quantity = get("quantity")?;
    let quantity = raw_quantity
        .parse::<u32>()
        .ok()
        .filter(|q| (MIN_QUANTITY..=MAX_QUANTITY).contains(q))
        .ok_or_else(|| CartParamError::InvalidQuantity(raw_quantity.to_string()))?;

    let price_id = get("priceId")?;
    if !PRICE_ID.is_match(price_id) {
        return Err(CartParamError::InvalidPriceId(price_id.to_string()));
    }

    let raw_unit_price = get("unitPrice")?;
    let unit_price = sanitize_number(raw_unit_price)
        .filter(|p| !p.is_sign_negative() && *p <= MAX_UNIT_PRICE)
        .ok_or_else(|| CartParamError::InvalidUnitPrice(raw_unit_price.to_string()))?;

    let product_name = params
        .get("productName")
        .map(|name| sanitize_string(name))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| product.display_name().to_string());

    Ok(CartSelection {
        product,
        product_name,
        quantity,
        price_id: price_id.to_string(),
        unit_price,
    })
}
