use crate::models::CartSelection;
use rust_decimal::Decimal;
use serde::Serialize;

/// Order total as shown on the page.
///
/// `estimated_total` is summed locally from the link's unit price. Once the
/// payment platform reports the amount it will charge, `total` shows that
/// figure instead and `charge_differs` flags any gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DisplayTotals {
    pub subtotal: Decimal,
    /// None until a quote or payment response supplies it; never assumed zero
    pub shipping: Option<Decimal>,
    pub tax: Decimal,
    pub total: Decimal,
    pub estimated_total: Decimal,
    /// Amount held by the payment intent
    pub charged: Option<Decimal>,
    pub charge_differs: bool,
    /// A reconciliation is scheduled or in flight, so the figures may change
    pub recalculating: bool,
}

impl DisplayTotals {
    pub fn compute(
        cart: &CartSelection,
        shipping: Option<Decimal>,
        tax: Decimal,
        charged: Option<Decimal>,
        recalculating: bool,
    ) -> Self {
        let subtotal = cart.subtotal();
        let estimated_total = subtotal + shipping.unwrap_or_default() + tax;
        Self {
            subtotal,
            shipping,
            tax,
            total: charged.unwrap_or(estimated_total),
            estimated_total,
            charged,
            charge_differs: charged.is_some_and(|amount| amount != estimated_total),
            recalculating,
        }
    }
}
