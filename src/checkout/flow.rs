use super::{
    api::{CheckoutApi, CheckoutApiError},
    identity::Identity,
    params::{parse_cart_query, CartParamError},
    reconciler::{ReconcileCall, ReconcileInput, ReconcilePhase, Reconciler},
    shipping::{QuoteLookup, ShippingResolver, ShippingStatus},
    totals::DisplayTotals,
};
use crate::{
    config::AppConfig,
    models::{
        AddressField, CartSelection, PaymentIntentResponse, ShippingAddress, TaxDetail,
    },
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Snapshot of the checkout page, republished after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutView {
    pub cart: CartSelection,
    pub address: ShippingAddress,
    /// Field-level message; blocks payment, not editing
    pub email_error: Option<String>,
    pub shipping: ShippingStatus,
    pub phase: ReconcilePhase,
    pub client_secret: Option<String>,
    pub payment_intent_id: Option<String>,
    pub tax_details: Vec<TaxDetail>,
    pub totals: DisplayTotals,
    /// Set when the payment intent could not be created
    pub blocking_error: Option<String>,
}

impl CheckoutView {
    fn initial(cart: &CartSelection, address: &ShippingAddress) -> Self {
        Self {
            cart: cart.clone(),
            address: address.clone(),
            email_error: address.email_error(),
            shipping: ShippingStatus::default(),
            phase: ReconcilePhase::default(),
            client_secret: None,
            payment_intent_id: None,
            tax_details: Vec::new(),
            totals: DisplayTotals::compute(cart, None, Decimal::ZERO, None, false),
            blocking_error: None,
        }
    }

    pub fn payment_ready(&self) -> bool {
        self.client_secret.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    /// Quiet period after the last edit before the payment intent is reconciled
    pub debounce: Duration,
    /// Sent with the create call; one per checkout session
    pub idempotency_key: Option<String>,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            idempotency_key: None,
        }
    }
}

impl CheckoutOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debounce: config.checkout_debounce(),
            ..Self::default()
        }
    }
}

type AddressEdit = Box<dyn FnOnce(&mut ShippingAddress) + Send>;

enum Command {
    Edit(AddressEdit),
    Retry,
}

enum SessionEvent {
    Quote {
        seq: u64,
        result: Result<Decimal, CheckoutApiError>,
    },
    Created {
        seq: u64,
        result: Result<PaymentIntentResponse, CheckoutApiError>,
    },
    Updated {
        seq: u64,
        result: Result<PaymentIntentResponse, CheckoutApiError>,
    },
}

/// Event loop owning all mutable checkout state.
struct Session {
    cart: CartSelection,
    identity: Identity,
    address: ShippingAddress,
    api: Arc<dyn CheckoutApi>,
    resolver: ShippingResolver,
    reconciler: Reconciler,
    /// Latest shipping figure from a quote or a payment response
    shipping_display: Option<Decimal>,
    debounce: Duration,
    debounce_armed: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
    view: watch::Sender<CheckoutView>,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        // The one debounce timer; edits move its deadline instead of adding timers
        let timer = tokio::time::sleep(self.debounce);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Edit(edit)) => {
                        edit(&mut self.address);
                        self.refresh_shipping();
                        timer.as_mut().reset(Instant::now() + self.debounce);
                        self.debounce_armed = true;
                    }
                    Some(Command::Retry) => {
                        self.debounce_armed = false;
                        self.reconcile();
                    }
                    None => break,
                },
                Some(event) = events.recv() => {
                    if self.handle_event(event) {
                        timer.as_mut().reset(Instant::now() + self.debounce);
                        self.debounce_armed = true;
                    }
                }
                () = &mut timer, if self.debounce_armed => {
                    self.debounce_armed = false;
                    self.reconcile();
                }
            }
            self.publish();
        }
        debug!("checkout session closed");
    }

    fn input(&self) -> ReconcileInput<'_> {
        ReconcileInput {
            cart: &self.cart,
            address: &self.address,
            quote: self.resolver.quote(),
            identity: &self.identity,
        }
    }

    fn refresh_shipping(&mut self) {
        if let Some(lookup) = self.resolver.on_address_change(&self.address, &self.cart) {
            // the old figure belongs to the previous destination
            self.shipping_display = None;
            self.spawn_quote(lookup);
        } else if !self.address.has_destination() {
            self.shipping_display = None;
        }
    }

    fn spawn_quote(&self, lookup: QuoteLookup) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = api
                .shipping_quote(&lookup.request)
                .await
                .map(|response| response.cost);
            // the session may be gone
            let _ = events.send(SessionEvent::Quote {
                seq: lookup.seq,
                result,
            });
        });
    }

    fn reconcile(&mut self) {
        let input = ReconcileInput {
            cart: &self.cart,
            address: &self.address,
            quote: self.resolver.quote(),
            identity: &self.identity,
        };
        if let Some(call) = self.reconciler.on_quiet(input) {
            self.dispatch(call);
        }
    }

    fn dispatch(&self, call: ReconcileCall) {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = match call {
                ReconcileCall::Create {
                    seq,
                    request,
                    idempotency_key,
                } => {
                    info!(seq, "creating payment intent");
                    SessionEvent::Created {
                        seq,
                        result: api.create_payment_intent(&request, &idempotency_key).await,
                    }
                }
                ReconcileCall::Update { seq, request } => {
                    debug!(seq, payment_intent_id = %request.payment_intent_id, "updating payment intent");
                    SessionEvent::Updated {
                        seq,
                        result: api.update_payment_intent(&request).await,
                    }
                }
            };
            let _ = events.send(event);
        });
    }

    /// Returns true when a new shipping quote landed and the quiet period should restart.
    fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Quote { seq, result } => {
                let applied = self.resolver.on_quote(seq, result);
                if applied {
                    self.shipping_display = self.resolver.quote().cost;
                }
                applied
            }
            SessionEvent::Created { seq, result } => {
                let follow_up = self.reconciler.on_create_result(seq, result);
                if self.reconciler.state().is_created() {
                    self.shipping_display = self.reconciler.shipping_cost();
                }
                if follow_up {
                    self.reconcile();
                }
                false
            }
            SessionEvent::Updated { seq, result } => {
                if self.reconciler.on_update_result(seq, result) {
                    self.shipping_display = self.reconciler.shipping_cost();
                }
                false
            }
        }
    }

    fn snapshot(&self) -> CheckoutView {
        let state = self.reconciler.state();
        let recalculating = (self.debounce_armed && self.input().is_ready())
            || self.resolver.is_pending()
            || self.reconciler.is_in_flight();

        CheckoutView {
            cart: self.cart.clone(),
            address: self.address.clone(),
            email_error: self.address.email_error(),
            shipping: self.resolver.status(),
            phase: self.reconciler.phase(),
            client_secret: state.client_secret.clone(),
            payment_intent_id: state.payment_intent_id.clone(),
            tax_details: state.tax_details.clone(),
            totals: DisplayTotals::compute(
                &self.cart,
                self.shipping_display,
                state.tax_amount,
                state.amount,
                recalculating,
            ),
            blocking_error: self.reconciler.blocking_error().map(str::to_string),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Handle to a running checkout session.
///
/// Edits are queued to the session task, which owns the address, the shipping
/// resolver and the payment reconciler. Dropping the handle ends the session.
pub struct CheckoutFlow {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<CheckoutView>,
    task: JoinHandle<()>,
}

impl CheckoutFlow {
    /// Parses the checkout link and starts the session. Must run inside a tokio runtime.
    pub fn start(
        query: &str,
        identity: Identity,
        api: Arc<dyn CheckoutApi>,
        options: CheckoutOptions,
    ) -> Result<Self, CartParamError> {
        let cart = parse_cart_query(query)?;
        let address = identity.default_address();
        let idempotency_key = options
            .idempotency_key
            .unwrap_or_else(|| format!("checkout-{}", Uuid::new_v4()));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (view_tx, view_rx) = watch::channel(CheckoutView::initial(&cart, &address));
        let session = Session {
            cart,
            identity,
            address,
            api,
            resolver: ShippingResolver::new(),
            reconciler: Reconciler::new(idempotency_key),
            shipping_display: None,
            debounce: options.debounce,
            debounce_armed: false,
            events: events_tx,
            view: view_tx,
        };

        info!(product = %session.cart.product, quantity = session.cart.quantity, "checkout started");
        let task = tokio::spawn(session.run(commands_rx, events_rx));

        Ok(Self {
            commands: commands_tx,
            view: view_rx,
            task,
        })
    }

    pub fn edit_address(&self, edit: impl FnOnce(&mut ShippingAddress) + Send + 'static) {
        if self.commands.send(Command::Edit(Box::new(edit))).is_err() {
            debug!("edit dropped, checkout session already closed");
        }
    }

    pub fn set_field(&self, field: AddressField, value: impl Into<String>) {
        let value = value.into();
        self.edit_address(move |address| address.set(field, value));
    }

    /// Reconciles right away with the current address, e.g. after a failed create.
    pub fn retry(&self) {
        if self.commands.send(Command::Retry).is_err() {
            debug!("retry dropped, checkout session already closed");
        }
    }

    pub fn view(&self) -> CheckoutView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckoutView> {
        self.view.clone()
    }
}

impl Drop for CheckoutFlow {
    fn drop(&mut self) {
        self.task.abort();
    }
}
