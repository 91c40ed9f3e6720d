use crate::{
    errors::ServiceError,
    models::{Country, TaxDetail},
};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One taxing jurisdiction and its component rates, as percentages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxRate {
    pub region: String,
    pub country: Country,
    /// Label and percentage of each component (state, county, provincial...)
    pub components: Vec<(String, Decimal)>,
    /// Whether shipping is part of the taxable amount
    pub taxes_shipping: bool,
}

impl TaxRate {
    fn new(region: &str, country: Country, components: &[(&str, Decimal)], taxes_shipping: bool) -> Self {
        Self {
            region: region.to_string(),
            country,
            components: components
                .iter()
                .map(|(label, pct)| (label.to_string(), *pct))
                .collect(),
            taxes_shipping,
        }
    }

    pub fn total_percentage(&self) -> Decimal {
        self.components.iter().map(|(_, pct)| *pct).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCalculation {
    pub taxable_amount: Decimal,
    pub tax_amount: Decimal,
    pub details: Vec<TaxDetail>,
    pub jurisdiction: String,
}

/// Sales tax calculation by destination state or province
#[derive(Debug, Clone)]
pub struct TaxService {
    tax_rates: HashMap<(Country, String), TaxRate>,
    /// Percentage applied to US states without an entry
    default_us_percentage: Decimal,
    default_ca_percentage: Decimal,
}

impl Default for TaxService {
    fn default() -> Self {
        Self::new(dec!(0.05))
    }
}

impl TaxService {
    /// `default_rate` is a fraction (0.05 for 5%) used for US states not in the table
    pub fn new(default_rate: Decimal) -> Self {
        let us = Country::US;
        let ca = Country::CA;
        let rates = vec![
            TaxRate::new("FL", us, &[("FL State", dec!(6.0)), ("FL County", dec!(1.0))], true),
            TaxRate::new("CA", us, &[("CA State", dec!(7.25)), ("CA District", dec!(1.0))], false),
            TaxRate::new("NY", us, &[("NY State", dec!(4.0)), ("NY Local", dec!(4.5))], true),
            TaxRate::new("TX", us, &[("TX State", dec!(6.25)), ("TX Local", dec!(2.0))], true),
            TaxRate::new("GA", us, &[("GA State", dec!(4.0)), ("GA County", dec!(3.0))], true),
            TaxRate::new("AZ", us, &[("AZ State", dec!(5.6)), ("AZ City", dec!(2.8))], false),
            // No general sales tax
            TaxRate::new("OR", us, &[], false),
            TaxRate::new("MT", us, &[], false),
            TaxRate::new("NH", us, &[], false),
            TaxRate::new("DE", us, &[], false),
            TaxRate::new("AK", us, &[], false),
            TaxRate::new("ON", ca, &[("ON HST", dec!(13.0))], true),
            TaxRate::new("QC", ca, &[("GST", dec!(5.0)), ("QC QST", dec!(9.975))], true),
            TaxRate::new("BC", ca, &[("GST", dec!(5.0)), ("BC PST", dec!(7.0))], false),
            TaxRate::new("AB", ca, &[("GST", dec!(5.0))], true),
        ];

        Self {
            tax_rates: rates
                .into_iter()
                .map(|rate| ((rate.country, rate.region.clone()), rate))
                .collect(),
            default_us_percentage: default_rate * dec!(100),
            default_ca_percentage: dec!(5.0),
        }
    }

    fn rate_for(&self, state: &str, country: Country) -> TaxRate {
        let region = state.trim().to_uppercase();
        if let Some(rate) = self.tax_rates.get(&(country, region.clone())) {
            return rate.clone();
        }
        match country {
            Country::US => TaxRate::new(
                &region,
                country,
                &[(format!("{} State", region).as_str(), self.default_us_percentage)],
                true,
            ),
            Country::CA => TaxRate::new(&region, country, &[("GST", self.default_ca_percentage)], true),
        }
    }

    /// Tax owed on `subtotal` (and `shipping` where the jurisdiction taxes it)
    pub fn calculate_tax(
        &self,
        subtotal: Decimal,
        shipping: Decimal,
        state: &str,
        country: Country,
    ) -> Result<TaxCalculation, ServiceError> {
        if subtotal.is_sign_negative() || shipping.is_sign_negative() {
            return Err(ServiceError::InvalidInput(
                "Taxable amounts cannot be negative".to_string(),
            ));
        }

        let rate = self.rate_for(state, country);
        let taxable_amount = if rate.taxes_shipping {
            subtotal + shipping
        } else {
            subtotal
        };

        let details: Vec<TaxDetail> = rate
            .components
            .iter()
            .map(|(label, percentage)| TaxDetail {
                amount: round_cents(taxable_amount * *percentage / dec!(100)),
                rate: label.clone(),
                percentage: *percentage,
            })
            .collect();
        let tax_amount = details.iter().map(|d| d.amount).sum();

        debug!(
            "Tax calculation: ${} @ {}% = ${}",
            taxable_amount,
            rate.total_percentage(),
            tax_amount
        );

        Ok(TaxCalculation {
            taxable_amount,
            tax_amount,
            details,
            jurisdiction: format!("{}, {}", rate.region, country),
        })
    }
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
