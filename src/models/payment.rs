use super::{ProductCode, ShippingAddress};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of the tax breakdown returned alongside a payment intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxDetail {
    pub amount: Decimal,
    /// Jurisdiction label, e.g. "FL State"
    pub rate: String,
    pub percentage: Decimal,
}

/// Shipping address as sent over the wire: the form fields plus `postal_code`,
/// a copy of `zip` expected by the fulfillment integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAddress {
    #[serde(flatten)]
    pub address: ShippingAddress,
    pub postal_code: String,
}

impl From<ShippingAddress> for WireAddress {
    fn from(address: ShippingAddress) -> Self {
        let postal_code = address.zip.clone();
        Self {
            address,
            postal_code,
        }
    }
}

/// `POST /api/create-payment-intent` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub price_id: String,
    pub quantity: u32,
    pub product: ProductCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub shipping_address: WireAddress,
}

/// `POST /api/update-payment-intent` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentIntentRequest {
    pub payment_intent_id: String,
    pub shipping_address: WireAddress,
    pub product: ProductCode,
    pub quantity: u32,
    pub price_id: String,
}

/// Server-authoritative payment state returned by both create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(default)]
    pub tax_details: Vec<TaxDetail>,
    pub shipping_cost: Decimal,
    /// Amount the payment platform will charge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

/// Client mirror of the remote payment object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentReconciliationState {
    pub client_secret: Option<String>,
    pub payment_intent_id: Option<String>,
    pub tax_amount: Decimal,
    pub tax_details: Vec<TaxDetail>,
    /// What the payment platform will charge, when the server reported it
    pub amount: Option<Decimal>,
}

impl PaymentReconciliationState {
    pub fn is_created(&self) -> bool {
        self.payment_intent_id.is_some() || self.client_secret.is_some()
    }

    pub fn apply(&mut self, response: &PaymentIntentResponse) {
        self.client_secret = Some(response.client_secret.clone());
        self.payment_intent_id = Some(response.payment_intent_id.clone());
        self.tax_amount = response.tax_amount;
        self.tax_details = response.tax_details.clone();
        self.amount = response.amount;
    }
}
