//! Client side of the checkout: parses the checkout link, quotes shipping,
//! reconciles the payment intent as the shopper edits their address, confirms
//! payment and reads back the finished order.

pub mod api;
pub mod confirmation;
pub mod flow;
pub mod identity;
pub mod params;
pub mod payment;
pub mod reconciler;
pub mod shipping;
pub mod totals;

pub use api::{CheckoutApi, CheckoutApiError, HttpCheckoutApi};
pub use confirmation::{load_confirmation, ConfirmationView, OrderReference};
pub use flow::{CheckoutFlow, CheckoutOptions, CheckoutView, DEFAULT_DEBOUNCE};
pub use identity::Identity;
pub use params::{parse_cart, parse_cart_query, CartParamError, CATALOG_PATH};
pub use payment::{ConfirmOutcome, PaymentConfirmer, PaymentForm, PaymentFormState, StripeConfirmer};
pub use reconciler::{ReconcileCall, ReconcileInput, ReconcilePhase, Reconciler};
pub use shipping::{ShippingResolver, ShippingStatus};
pub use totals::DisplayTotals;
