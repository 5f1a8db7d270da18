// Order lifecycle
pub mod orders;
pub mod order_status;
pub mod payments;
pub mod paypal;
pub mod pricing;
pub mod discounts;
pub mod invoices;
pub mod reference_numbers;

// Kits and patients
pub mod barcodes;
pub mod kit_registrations;
pub mod kit_status;
pub mod labs;
pub mod inventory;

// Staff notifications and housekeeping
pub mod notifications;
pub mod log_cleanup;

// Shared helpers
pub mod messages;
pub mod products;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

/// The staff member performing an action, as named in notifications.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: i32,
    pub name: String,
}
