use crate::{
    errors::ServiceError,
    models::{Country, ProductCode, ShippingQuoteRequest, MAX_QUANTITY},
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{debug, instrument};

static US_ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("static regex"));
static CA_POSTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]\d[A-Z] ?\d[A-Z]\d$").expect("static regex"));

/// States outside the contiguous US that ship at a surcharge
const REMOTE_US_STATES: [&str; 3] = ["AK", "HI", "PR"];

/// Per-product carrier rates: first unit and each additional unit.
#[derive(Debug, Clone, Copy)]
struct ProductRate {
    first_unit: Decimal,
    additional_unit: Decimal,
}

fn rate_for(product: ProductCode) -> ProductRate {
    match product {
        ProductCode::Mini => ProductRate {
            first_unit: dec!(9.95),
            additional_unit: dec!(2.00),
        },
        ProductCode::Sensor => ProductRate {
            first_unit: dec!(6.95),
            additional_unit: dec!(1.00),
        },
        ProductCode::Bundle => ProductRate {
            first_unit: dec!(12.95),
            additional_unit: dec!(3.00),
        },
    }
}

/// Computes shipping cost for a destination and a set of products.
#[derive(Debug, Clone)]
pub struct ShippingRateService {
    remote_multiplier: Decimal,
    canada_multiplier: Decimal,
    canada_flat_fee: Decimal,
    /// Units beyond this ship by pallet at a flat per-unit rate
    bulk_threshold: u32,
    bulk_unit_rate: Decimal,
}

impl Default for ShippingRateService {
    fn default() -> Self {
        Self::new()
    }
}

impl ShippingRateService {
    pub fn new() -> Self {
        Self {
            remote_multiplier: dec!(1.5),
            canada_multiplier: dec!(1.35),
            canada_flat_fee: dec!(5.00),
            bulk_threshold: 100,
            bulk_unit_rate: dec!(0.75),
        }
    }

    /// Validates the destination postal code for its country.
    pub fn validate_destination(
        &self,
        state: &str,
        postal_code: &str,
        country: Country,
    ) -> Result<(), ServiceError> {
        if state.trim().is_empty() {
            return Err(ServiceError::InvalidInput("State is required".to_string()));
        }
        let postal = postal_code.trim().to_uppercase();
        let valid = match country {
            Country::US => US_ZIP.is_match(&postal),
            Country::CA => CA_POSTAL.is_match(&postal),
        };
        if !valid {
            return Err(ServiceError::InvalidInput(format!(
                "Invalid postal code for {}: {}",
                country, postal_code
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn quote(&self, request: &ShippingQuoteRequest) -> Result<Decimal, ServiceError> {
        let address = &request.address;
        self.validate_destination(&address.state, &address.postal_code, address.country)?;

        if request.products.is_empty() {
            return Err(ServiceError::InvalidInput(
                "At least one product is required".to_string(),
            ));
        }

        let total_units: u32 = request.products.values().sum();
        if request.products.values().any(|qty| *qty == 0) || total_units > MAX_QUANTITY {
            return Err(ServiceError::InvalidInput(format!(
                "Quantities must be between 1 and {}",
                MAX_QUANTITY
            )));
        }

        let mut cost = Decimal::ZERO;
        let mut counted_units = 0u32;
        for (product, quantity) in &request.products {
            let rate = rate_for(*product);
            for unit in 0..*quantity {
                counted_units += 1;
                cost += if counted_units > self.bulk_threshold {
                    self.bulk_unit_rate
                } else if unit == 0 {
                    rate.first_unit
                } else {
                    rate.additional_unit
                };
            }
        }

        match address.country {
            Country::US => {
                let state = address.state.trim().to_uppercase();
                if REMOTE_US_STATES.contains(&state.as_str()) {
                    cost *= self.remote_multiplier;
                }
            }
            Country::CA => {
                cost = cost * self.canada_multiplier + self.canada_flat_fee;
            }
        }

        let cost = cost.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        debug!(%cost, units = total_units, "shipping quoted");
        Ok(cost)
    }
}
