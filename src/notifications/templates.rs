//! Minimal HTML bodies for outbound email and the invoice document.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::services::pricing::Breakdown;

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Arial,sans-serif\">\
         <h2>{}</h2>{}<p>Theranostics DNA</p></body></html>",
        escape(heading),
        body
    )
}

fn money(value: Decimal) -> String {
    format!("${:.2}", value)
}

pub fn order_confirmation(
    customer_name: &str,
    order_number: &str,
    product_name: &str,
    breakdown: &Breakdown,
    invoice_link: Option<&str>,
) -> String {
    let invoice = invoice_link
        .map(|link| format!("<p><a href=\"{0}\">Download your invoice</a></p>", escape(link)))
        .unwrap_or_default();
    layout(
        "Order Confirmation",
        &format!(
            "<p>Hi {},</p><p>Thank you for your order <strong>{}</strong>.</p>\
             <p>{} x {}<br>Subtotal: {}<br>Discount: -{}<br>GST: {}<br>Total: {}</p>{}",
            escape(customer_name),
            escape(order_number),
            breakdown.quantity,
            escape(product_name),
            money(breakdown.subtotal),
            money(breakdown.discount),
            money(breakdown.tax),
            money(breakdown.total),
            invoice
        ),
    )
}

pub fn new_order_admin(
    customer_name: &str,
    customer_email: &str,
    order_number: &str,
    product_name: &str,
    quantity: i32,
    total: Decimal,
) -> String {
    layout(
        "New Order Received",
        &format!(
            "<p>{} ({}) paid for order <strong>{}</strong>: {} x {}, total {}.</p>",
            escape(customer_name),
            escape(customer_email),
            escape(order_number),
            quantity,
            escape(product_name),
            money(total)
        ),
    )
}

pub fn order_status_update(
    customer_name: &str,
    order_number: &str,
    status: &str,
    tracking_id: Option<&str>,
) -> String {
    let tracking = tracking_id
        .filter(|t| !t.is_empty())
        .map(|t| format!("<p>Tracking ID: {}</p>", escape(t)))
        .unwrap_or_default();
    layout(
        "Order Status Update",
        &format!(
            "<p>Hi {},</p><p>Your order <strong>{}</strong> is now <strong>{}</strong>.</p>{}",
            escape(customer_name),
            escape(order_number),
            escape(status),
            tracking
        ),
    )
}

pub fn new_kit_registration_admin(
    patient_name: &str,
    barcode_number: &str,
    order_number: &str,
    customer_name: &str,
) -> String {
    layout(
        "New Kit Registration",
        &format!(
            "<p>A kit has been registered for {}.</p>\
             <p>QRCode/Barcode: {}<br>Order: {}<br>Customer: {}</p>",
            escape(patient_name),
            escape(barcode_number),
            escape(order_number),
            escape(customer_name)
        ),
    )
}

pub fn kit_registration_confirmation(
    recipient_name: &str,
    patient_name: &str,
    barcode_number: &str,
) -> String {
    layout(
        "Kit Registration Confirmation",
        &format!(
            "<p>Hi {},</p><p>The kit {} has been registered for {}. \
             We will let you know as soon as the lab receives it.</p>",
            escape(recipient_name),
            escape(barcode_number),
            escape(patient_name)
        ),
    )
}

pub fn kit_status_update(
    recipient_name: &str,
    barcode_number: &str,
    status: &str,
    reason: Option<&str>,
) -> String {
    let reason = reason
        .filter(|r| !r.is_empty())
        .map(|r| format!("<p>Reason: {}</p>", escape(r)))
        .unwrap_or_default();
    layout(
        "Kit Status Update",
        &format!(
            "<p>Hi {},</p><p>The status of kit {} is now <strong>{}</strong>.</p>{}",
            escape(recipient_name),
            escape(barcode_number),
            escape(status),
            reason
        ),
    )
}

pub fn lab_report(
    recipient_name: &str,
    patient_name: &str,
    barcode_number: &str,
    report_link: &str,
) -> String {
    layout(
        "Theranostics Lab Report",
        &format!(
            "<p>Hi {},</p><p>The lab report for {} (kit {}) is ready.</p>\
             <p><a href=\"{}\">View report</a></p>",
            escape(recipient_name),
            escape(patient_name),
            escape(barcode_number),
            escape(report_link)
        ),
    )
}

/// Fields printed on an invoice document.
pub struct InvoiceDocument<'a> {
    pub invoice_id: &'a str,
    pub issued_at: DateTime<Utc>,
    pub order_number: &'a str,
    pub customer_name: &'a str,
    pub customer_email: &'a str,
    pub billing_address: String,
    pub product_name: &'a str,
    pub breakdown: &'a Breakdown,
}

pub fn invoice_document(doc: &InvoiceDocument<'_>) -> String {
    let b = doc.breakdown;
    format!(
        "<!DOCTYPE html><html><head><title>Invoice {id}</title></head>\
         <body style=\"font-family:Arial,sans-serif\">\
         <h1>Tax Invoice</h1>\
         <p>Invoice: {id}<br>Date: {date}<br>Order: {order}</p>\
         <p>Bill to:<br>{name}<br>{email}<br>{address}</p>\
         <table border=\"1\" cellpadding=\"4\" cellspacing=\"0\">\
         <tr><th>Item</th><th>Qty</th><th>Unit price</th><th>Amount</th></tr>\
         <tr><td>{product}</td><td>{qty}</td><td>{unit}</td><td>{subtotal}</td></tr>\
         </table>\
         <p>Subtotal: {subtotal}<br>Discount: -{discount}<br>GST: {tax}<br>\
         <strong>Total: {total}</strong></p></body></html>",
        id = escape(doc.invoice_id),
        date = doc.issued_at.format("%Y-%m-%d"),
        order = escape(doc.order_number),
        name = escape(doc.customer_name),
        email = escape(doc.customer_email),
        address = escape(&doc.billing_address),
        product = escape(doc.product_name),
        qty = b.quantity,
        unit = money(b.unit_price),
        subtotal = money(b.subtotal),
        discount = money(b.discount),
        tax = money(b.tax),
        total = money(b.total),
    )
}
