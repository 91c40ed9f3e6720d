use crate::models::{
    CartSelection, QuoteDestination, ShippingAddress, ShippingQuote, ShippingQuoteRequest,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Shipping line as the shopper sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ShippingStatus {
    /// City, state or zip still missing
    #[default]
    AwaitingDestination,
    Calculating,
    Quoted(Decimal),
    Unavailable,
}

/// A quote request the session should send, tagged for staleness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLookup {
    pub seq: u64,
    pub request: ShippingQuoteRequest,
}

/// Tracks the destination and the latest shipping quote.
///
/// A lookup is issued only when city, state and zip are all present and the
/// trimmed triple differs from the last one looked up, or when the previous
/// lookup failed. Only the response to the most recent lookup is kept.
#[derive(Debug, Default)]
pub struct ShippingResolver {
    last_destination: Option<(String, String, String)>,
    retry_on_next_edit: bool,
    next_seq: u64,
    pending: Option<u64>,
    quote: ShippingQuote,
}

impl ShippingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote(&self) -> ShippingQuote {
        self.quote
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn status(&self) -> ShippingStatus {
        if self.pending.is_some() {
            return ShippingStatus::Calculating;
        }
        match (self.last_destination.is_some(), self.quote.cost) {
            (false, _) => ShippingStatus::AwaitingDestination,
            (true, Some(cost)) => ShippingStatus::Quoted(cost),
            (true, None) => ShippingStatus::Unavailable,
        }
    }

    /// Called after every address edit.
    pub fn on_address_change(
        &mut self,
        address: &ShippingAddress,
        cart: &CartSelection,
    ) -> Option<QuoteLookup> {
        if !address.has_destination() {
            if self.last_destination.take().is_some() {
                debug!("destination incomplete, clearing shipping quote");
            }
            self.pending = None;
            self.quote = ShippingQuote::unavailable();
            return None;
        }

        let key = address.destination_key();
        if self.last_destination.as_ref() == Some(&key) && !self.retry_on_next_edit {
            return None;
        }

        self.retry_on_next_edit = false;
        self.next_seq += 1;
        self.pending = Some(self.next_seq);
        let (city, state, postal_code) = key.clone();
        self.last_destination = Some(key);

        Some(QuoteLookup {
            seq: self.next_seq,
            request: ShippingQuoteRequest {
                address: QuoteDestination {
                    city,
                    state,
                    postal_code,
                    country: address.country,
                },
                products: BTreeMap::from([(cart.product, cart.quantity)]),
            },
        })
    }

    /// Applies a quote result; returns false when it belongs to a superseded lookup.
    pub fn on_quote<E: std::fmt::Display>(&mut self, seq: u64, result: Result<Decimal, E>) -> bool {
        if self.pending != Some(seq) {
            debug!(seq, "discarding stale shipping quote");
            return false;
        }
        self.pending = None;
        self.quote = match result {
            Ok(cost) => ShippingQuote::available(cost),
            Err(err) => {
                warn!(error = %err, "shipping quote failed");
                self.retry_on_next_edit = true;
                ShippingQuote::unavailable()
            }
        };
        true
    }
}
