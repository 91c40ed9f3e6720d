use super::{api::CheckoutApiError, identity::Identity};
use crate::{
    middleware_helpers::sanitize::sanitize_address,
    models::{
        CartSelection, CreatePaymentIntentRequest, PaymentIntentResponse,
        PaymentReconciliationState, ShippingAddress, ShippingQuote, UpdatePaymentIntentRequest,
        WireAddress,
    },
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use strum::Display;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
pub enum ReconcilePhase {
    #[default]
    Uninitialized,
    Creating,
    Created,
    Updating,
}

/// Remote call the session should make, tagged with its sequence number.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileCall {
    Create {
        seq: u64,
        request: CreatePaymentIntentRequest,
        idempotency_key: String,
    },
    Update {
        seq: u64,
        request: UpdatePaymentIntentRequest,
    },
}

impl ReconcileCall {
    pub fn seq(&self) -> u64 {
        match self {
            ReconcileCall::Create { seq, .. } | ReconcileCall::Update { seq, .. } => *seq,
        }
    }
}

/// Everything the reconciler reads but does not own.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub cart: &'a CartSelection,
    pub address: &'a ShippingAddress,
    pub quote: ShippingQuote,
    pub identity: &'a Identity,
}

impl ReconcileInput<'_> {
    /// A quote exists, every required field is filled and the email is acceptable
    pub fn is_ready(&self) -> bool {
        self.quote.cost.is_some()
            && self.address.has_valid_email()
            && sanitize_address(self.address).is_complete()
    }
}

/// Create-or-update state machine for the session's payment intent.
///
/// Does no I/O: the session calls [`Reconciler::on_quiet`] when the debounce
/// timer fires, performs the returned call, and feeds the outcome back.
/// Once an intent id is held, only updates are ever produced.
///
/// A failed create is resent under the same idempotency key only while the
/// request is unchanged; a different request gets a derived key, since the
/// payment platform rejects a reused key carrying other parameters.
#[derive(Debug)]
pub struct Reconciler {
    phase: ReconcilePhase,
    state: PaymentReconciliationState,
    shipping_cost: Option<Decimal>,
    base_key: String,
    idempotency_key: String,
    key_generation: u32,
    next_seq: u64,
    last_applied_seq: u64,
    create_seq: Option<u64>,
    create_in_flight: Option<CreatePaymentIntentRequest>,
    failed_create: Option<CreatePaymentIntentRequest>,
    updates_in_flight: BTreeSet<u64>,
    /// An edit settled while the create was in flight
    dirty: bool,
    last_sent: Option<ShippingAddress>,
    blocking_error: Option<String>,
}

impl Reconciler {
    pub fn new(idempotency_key: impl Into<String>) -> Self {
        let base_key = idempotency_key.into();
        Self {
            phase: ReconcilePhase::Uninitialized,
            state: PaymentReconciliationState::default(),
            shipping_cost: None,
            idempotency_key: base_key.clone(),
            base_key,
            key_generation: 0,
            next_seq: 0,
            last_applied_seq: 0,
            create_seq: None,
            create_in_flight: None,
            failed_create: None,
            updates_in_flight: BTreeSet::new(),
            dirty: false,
            last_sent: None,
            blocking_error: None,
        }
    }

    pub fn phase(&self) -> ReconcilePhase {
        self.phase
    }

    pub fn state(&self) -> &PaymentReconciliationState {
        &self.state
    }

    /// Shipping cost confirmed by the server, superseding the quote
    pub fn shipping_cost(&self) -> Option<Decimal> {
        self.shipping_cost
    }

    pub fn blocking_error(&self) -> Option<&str> {
        self.blocking_error.as_deref()
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase == ReconcilePhase::Creating || !self.updates_in_flight.is_empty()
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// The quiet period after the last edit elapsed.
    pub fn on_quiet(&mut self, input: ReconcileInput<'_>) -> Option<ReconcileCall> {
        if !input.is_ready() {
            return None;
        }
        let address = sanitize_address(input.address);

        match self.phase {
            ReconcilePhase::Creating => {
                debug!("create in flight, deferring update until it lands");
                self.dirty = true;
                None
            }
            ReconcilePhase::Uninitialized => {
                let request = CreatePaymentIntentRequest {
                    price_id: input.cart.price_id.clone(),
                    quantity: input.cart.quantity,
                    product: input.cart.product,
                    user_email: input.identity.email.clone(),
                    user_id: input.identity.user_id.clone(),
                    shipping_address: WireAddress::from(address.clone()),
                };
                if let Some(failed) = self.failed_create.take() {
                    if failed != request {
                        self.rotate_key();
                    }
                }

                let seq = self.next_seq();
                self.phase = ReconcilePhase::Creating;
                self.create_seq = Some(seq);
                self.create_in_flight = Some(request.clone());
                self.blocking_error = None;
                self.last_sent = Some(address);

                Some(ReconcileCall::Create {
                    seq,
                    request,
                    idempotency_key: self.idempotency_key.clone(),
                })
            }
            ReconcilePhase::Created | ReconcilePhase::Updating => {
                if !self.state.is_created() || self.last_sent.as_ref() == Some(&address) {
                    return None;
                }
                let payment_intent_id = self.state.payment_intent_id.clone()?;
                let seq = self.next_seq();
                self.updates_in_flight.insert(seq);
                self.phase = ReconcilePhase::Updating;
                self.last_sent = Some(address.clone());

                Some(ReconcileCall::Update {
                    seq,
                    request: UpdatePaymentIntentRequest {
                        payment_intent_id,
                        shipping_address: WireAddress::from(address),
                        product: input.cart.product,
                        quantity: input.cart.quantity,
                        price_id: input.cart.price_id.clone(),
                    },
                })
            }
        }
    }

    fn rotate_key(&mut self) {
        self.key_generation += 1;
        self.idempotency_key = format!("{}-retry-{}", self.base_key, self.key_generation);
        info!(
            idempotency_key = %self.idempotency_key,
            "create request changed since the failed attempt, using a new idempotency key"
        );
    }

    fn apply(&mut self, seq: u64, response: &PaymentIntentResponse) {
        self.state.apply(response);
        self.shipping_cost = Some(response.shipping_cost);
        self.last_applied_seq = seq;
    }

    /// Returns true when edits arrived during the create and an update should follow now.
    pub fn on_create_result(
        &mut self,
        seq: u64,
        result: Result<PaymentIntentResponse, CheckoutApiError>,
    ) -> bool {
        if self.create_seq != Some(seq) {
            debug!(seq, "ignoring unexpected create response");
            return false;
        }
        self.create_seq = None;
        let sent = self.create_in_flight.take();

        match result {
            Ok(response) => {
                self.apply(seq, &response);
                self.phase = ReconcilePhase::Created;
                self.blocking_error = None;
                std::mem::take(&mut self.dirty)
            }
            Err(err) => {
                error!(error = %err, "payment intent creation failed");
                self.phase = ReconcilePhase::Uninitialized;
                self.blocking_error = Some(err.user_message());
                self.failed_create = sent;
                self.dirty = false;
                self.last_sent = None;
                false
            }
        }
    }

    /// Returns true when the response was applied.
    pub fn on_update_result(
        &mut self,
        seq: u64,
        result: Result<PaymentIntentResponse, CheckoutApiError>,
    ) -> bool {
        if !self.updates_in_flight.remove(&seq) {
            debug!(seq, "ignoring unexpected update response");
            return false;
        }
        if self.updates_in_flight.is_empty() {
            self.phase = ReconcilePhase::Created;
        }

        match result {
            Ok(response) if seq > self.last_applied_seq => {
                self.apply(seq, &response);
                true
            }
            Ok(_) => {
                debug!(
                    seq,
                    last_applied = self.last_applied_seq,
                    "discarding stale update response"
                );
                false
            }
            Err(err) => {
                warn!(error = %err, "payment intent update failed, keeping previous totals");
                if seq == self.next_seq {
                    self.last_sent = None;
                }
                false
            }
        }
    }
}
