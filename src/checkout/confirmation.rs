use super::api::CheckoutApi;
use crate::models::OrderSummary;
use serde::Serialize;
use tracing::warn;
use url::Url;

/// Identifier the payment platform appends to the return URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OrderReference {
    PaymentIntent(String),
    CheckoutSession(String),
}

impl OrderReference {
    /// Reads `payment_intent` or `session_id` from a query string.
    pub fn from_query(query: &str) -> Option<Self> {
        let mut payment_intent = None;
        let mut session = None;
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "payment_intent" => payment_intent = Some(value),
                "session_id" => session = Some(value),
                _ => {}
            }
        }
        payment_intent
            .map(OrderReference::PaymentIntent)
            .or_else(|| session.map(OrderReference::CheckoutSession))
    }

    pub fn from_redirect_url(redirect_url: &str) -> Option<Self> {
        let url = Url::parse(redirect_url).ok()?;
        Self::from_query(url.query()?)
    }

    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            OrderReference::PaymentIntent(id) => ("payment_intent", id),
            OrderReference::CheckoutSession(id) => ("session_id", id),
        }
    }

    pub fn id(&self) -> &str {
        self.query_pair().1
    }
}

/// What the confirmation page shows. There is no error variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConfirmationView {
    /// No identifier yet
    Loading,
    /// Lookup failed; thank the shopper without details
    ThankYou,
    Details(OrderSummary),
}

pub async fn load_confirmation(
    api: &dyn CheckoutApi,
    reference: Option<&OrderReference>,
) -> ConfirmationView {
    let Some(reference) = reference else {
        return ConfirmationView::Loading;
    };

    match api.order_details(reference).await {
        Ok(summary) => ConfirmationView::Details(summary),
        Err(err) => {
            warn!(order = reference.id(), error = %err, "order lookup failed");
            ConfirmationView::ThankYou
        }
    }
}
