// Checkout domain models
pub mod address;
pub mod cart;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod shipping;

pub use address::{AddressField, Country, ShippingAddress, MAX_EMAIL_LENGTH};
pub use cart::{CartSelection, ProductCode, MAX_QUANTITY, MIN_QUANTITY};
pub use order::{OrderLineItem, OrderShipping, OrderSummary};
pub use payment::{
    CreatePaymentIntentRequest, PaymentIntentResponse, PaymentReconciliationState, TaxDetail,
    UpdatePaymentIntentRequest, WireAddress,
};
pub use pricing::{PriceQuote, PriceTier};
pub use shipping::{QuoteDestination, ShippingQuote, ShippingQuoteRequest, ShippingQuoteResponse};
