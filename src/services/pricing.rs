//! Order pricing. The same stored snapshot (GST-exclusive unit price, GST per
//! unit, discount percentage, quantity) feeds the payment gateway breakdown,
//! the invoice and every email, so all of them go through [`breakdown`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Rounds to cents, halves away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Snapshot stored on the order at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPricing {
    /// GST-exclusive unit price.
    pub base_price: Decimal,
    pub gst_price: Decimal,
    pub discount_pct: Decimal,
    pub total_price: Decimal,
}

/// Prices an order from the GST-inclusive catalog price.
pub fn price_order(
    product_price: Decimal,
    gst_price: Decimal,
    discount_pct: Decimal,
    quantity: i32,
) -> OrderPricing {
    let base_price = product_price - gst_price;
    let discount_amount = base_price * discount_pct / HUNDRED;
    let discounted_unit = base_price - discount_amount;
    let total = (discounted_unit + gst_price) * Decimal::from(quantity);

    OrderPricing {
        base_price: round_money(base_price),
        gst_price: round_money(gst_price),
        discount_pct,
        total_price: round_money(total),
    }
}

/// Amount breakdown printed on invoices and sent to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Breakdown {
    pub unit_price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

pub fn breakdown(
    unit_price: Decimal,
    gst_price: Decimal,
    discount_pct: Decimal,
    quantity: i32,
) -> Breakdown {
    let qty = Decimal::from(quantity);
    let subtotal = round_money(unit_price * qty);
    let discount = round_money(subtotal * discount_pct / HUNDRED);
    let tax = round_money(gst_price * qty);
    Breakdown {
        unit_price: round_money(unit_price),
        quantity,
        subtotal,
        discount,
        tax,
        total: round_money(subtotal + tax - discount),
    }
}
