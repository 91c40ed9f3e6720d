use crate::{
    errors::ServiceError,
    models::{PriceQuote, PriceTier, ProductCode, MAX_QUANTITY, MIN_QUANTITY},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::{debug, instrument};
use url::Url;

/// Quantity-tiered price table for every product.
#[derive(Debug, Clone)]
pub struct PricingService {
    tiers: BTreeMap<ProductCode, Vec<PriceTier>>,
    site_url: Url,
}

fn tier(min_qty: u32, max_qty: u32, unit_price: Decimal, price_id: &str) -> PriceTier {
    PriceTier {
        min_qty,
        max_qty,
        unit_price,
        price_id: price_id.to_string(),
    }
}

/// Published price list
pub fn default_tiers() -> BTreeMap<ProductCode, Vec<PriceTier>> {
    BTreeMap::from([
        (
            ProductCode::Mini,
            vec![
                tier(1, 9, dec!(99.99), "price_mini_retail"),
                tier(10, 49, dec!(89.99), "price_mini_t10"),
                tier(50, 199, dec!(79.99), "price_mini_t50"),
                tier(200, 500, dec!(69.99), "price_mini_t200"),
            ],
        ),
        (
            ProductCode::Sensor,
            vec![
                tier(1, 9, dec!(49.99), "price_sensor_retail"),
                tier(10, 49, dec!(44.99), "price_sensor_t10"),
                tier(50, 199, dec!(39.99), "price_sensor_t50"),
                tier(200, 500, dec!(34.99), "price_sensor_t200"),
            ],
        ),
        (
            ProductCode::Bundle,
            vec![
                tier(1, 9, dec!(139.99), "price_bundle_retail"),
                tier(10, 49, dec!(124.99), "price_bundle_t10"),
                tier(50, 199, dec!(109.99), "price_bundle_t50"),
                tier(200, 500, dec!(99.99), "price_bundle_t200"),
            ],
        ),
    ])
}

impl PricingService {
    pub fn new(site_url: &str) -> Result<Self, ServiceError> {
        Self::with_tiers(default_tiers(), site_url)
    }

    /// Builds a price table, rejecting any product whose tiers leave a gap or overlap in 1..=500.
    pub fn with_tiers(
        tiers: BTreeMap<ProductCode, Vec<PriceTier>>,
        site_url: &str,
    ) -> Result<Self, ServiceError> {
        for product in ProductCode::iter() {
            let bands = tiers.get(&product).ok_or_else(|| {
                ServiceError::InternalError(format!("No price tiers for {}", product))
            })?;
            let mut expected = MIN_QUANTITY;
            for band in bands {
                if band.min_qty != expected || band.max_qty < band.min_qty {
                    return Err(ServiceError::InternalError(format!(
                        "Price tiers for {} are not contiguous at quantity {}",
                        product, expected
                    )));
                }
                if band.unit_price < Decimal::ZERO {
                    return Err(ServiceError::InternalError(format!(
                        "Negative unit price in tier {}",
                        band.price_id
                    )));
                }
                expected = band.max_qty + 1;
            }
            if expected != MAX_QUANTITY + 1 {
                return Err(ServiceError::InternalError(format!(
                    "Price tiers for {} stop at quantity {}",
                    product,
                    expected - 1
                )));
            }
        }

        let site_url = Url::parse(site_url)
            .map_err(|e| ServiceError::InternalError(format!("Invalid site URL: {}", e)))?;

        Ok(Self { tiers, site_url })
    }

    pub fn tier_for(&self, product: ProductCode, quantity: u32) -> Result<&PriceTier, ServiceError> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity must be between {} and {}",
                MIN_QUANTITY, MAX_QUANTITY
            )));
        }

        self.tiers
            .get(&product)
            .and_then(|bands| bands.iter().find(|band| band.contains(quantity)))
            .ok_or_else(|| ServiceError::NotFound(format!("No price for {} x{}", product, quantity)))
    }

    /// Finds the tier a price id belongs to
    pub fn by_price_id(&self, price_id: &str) -> Option<(ProductCode, &PriceTier)> {
        self.tiers.iter().find_map(|(product, bands)| {
            bands
                .iter()
                .find(|band| band.price_id == price_id)
                .map(|band| (*product, band))
        })
    }

    /// Confirms a client-supplied price id is the one this product and quantity map to.
    pub fn verify(
        &self,
        product: ProductCode,
        quantity: u32,
        price_id: &str,
    ) -> Result<&PriceTier, ServiceError> {
        let expected = self.tier_for(product, quantity)?;
        if expected.price_id != price_id {
            return Err(ServiceError::InvalidInput(format!(
                "Price {} does not apply to {} x{}",
                price_id, product, quantity
            )));
        }
        Ok(expected)
    }

    #[instrument(skip(self))]
    pub fn lookup(&self, product: ProductCode, quantity: u32) -> Result<PriceQuote, ServiceError> {
        let band = self.tier_for(product, quantity)?;
        let product_name = product.display_name().to_string();

        let mut checkout_url = self
            .site_url
            .join("/checkout")
            .map_err(|e| ServiceError::InternalError(format!("Invalid checkout URL: {}", e)))?;
        checkout_url
            .query_pairs_mut()
            .append_pair("product", product.as_ref())
            .append_pair("productName", &product_name)
            .append_pair("quantity", &quantity.to_string())
            .append_pair("priceId", &band.price_id)
            .append_pair("unitPrice", &band.unit_price.to_string());

        debug!(price_id = %band.price_id, unit_price = %band.unit_price, "price resolved");

        Ok(PriceQuote {
            product,
            product_name,
            quantity,
            price_id: band.price_id.clone(),
            unit_price: band.unit_price,
            checkout_url: checkout_url.to_string(),
        })
    }
}
