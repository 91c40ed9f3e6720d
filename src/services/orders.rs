use crate::{
    errors::ServiceError,
    metrics::ORDER_LOOKUPS,
    models::{OrderLineItem, OrderShipping, OrderSummary, ProductCode},
    services::stripe::{
        from_minor_units, PaymentGateway, StripeCheckoutSession, StripePaymentIntent,
        StripeShipping,
    },
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::{str::FromStr, sync::Arc};
use tracing::{debug, instrument};

static ORDER_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(pi|cs)_[A-Za-z0-9_]+$").expect("static regex"));

/// Resolves a payment intent or checkout session id into order details.
#[derive(Clone)]
pub struct OrderLookupService {
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl OrderLookupService {
    pub fn new(gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self))]
    pub async fn lookup(&self, reference: &str) -> Result<OrderSummary, ServiceError> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("Payment processing is not configured".to_string())
        })?;
        let reference = reference.trim();
        if !ORDER_REFERENCE.is_match(reference) {
            return Err(ServiceError::InvalidInput(
                "Invalid order reference".to_string(),
            ));
        }

        ORDER_LOOKUPS.inc();
        let summary = if reference.starts_with("cs_") {
            summary_from_session(gateway.retrieve_checkout_session(reference).await?)
        } else {
            summary_from_intent(gateway.retrieve_payment_intent(reference).await?)
        };
        debug!(status = %summary.payment_status, "order resolved");
        Ok(summary)
    }
}

fn order_shipping(shipping: StripeShipping) -> OrderShipping {
    let address = shipping.address;
    OrderShipping {
        name: shipping.name,
        line1: address.line1,
        line2: address.line2.filter(|l| !l.is_empty()),
        city: address.city,
        state: address.state,
        postal_code: address.postal_code,
        country: address.country,
    }
}

fn summary_from_intent(intent: StripePaymentIntent) -> OrderSummary {
    let amount_total = from_minor_units(intent.amount);
    let product = intent
        .metadata
        .get("product")
        .and_then(|p| ProductCode::from_str(p).ok());
    let quantity = intent
        .metadata
        .get("quantity")
        .and_then(|q| q.parse::<u32>().ok());

    let line_items = match (product, quantity) {
        (Some(product), Some(quantity)) => {
            let line_total = intent
                .metadata
                .get("subtotal")
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(amount_total);
            vec![OrderLineItem {
                description: product.display_name().to_string(),
                quantity,
                amount_total: line_total,
            }]
        }
        _ => Vec::new(),
    };

    OrderSummary {
        amount_total,
        currency: intent.currency,
        payment_status: intent.status,
        shipping: intent.shipping.map(order_shipping),
        line_items,
    }
}

fn summary_from_session(session: StripeCheckoutSession) -> OrderSummary {
    let shipping = session.shipping_details.map(order_shipping).or_else(|| {
        session.customer_details.and_then(|customer| {
            customer.address.map(|address| {
                order_shipping(StripeShipping {
                    name: customer.name,
                    address,
                })
            })
        })
    });

    OrderSummary {
        amount_total: from_minor_units(session.amount_total.unwrap_or_default()),
        currency: session.currency.unwrap_or_else(|| "usd".to_string()),
        payment_status: session.payment_status,
        shipping,
        line_items: session
            .line_items
            .map(|list| {
                list.data
                    .into_iter()
                    .map(|item| OrderLineItem {
                        description: item.description.unwrap_or_default(),
                        quantity: item.quantity.unwrap_or(1),
                        amount_total: from_minor_units(item.amount_total),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}
