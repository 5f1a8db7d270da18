//! Database entities for the fulfillment domain.
//!
//! Every table carries an integer primary key, `created_at`/`updated_at`
//! timestamps and, where rows can be withdrawn, an `is_deleted` soft-delete
//! flag that all reads filter on.

pub mod barcode;
pub mod customer;
pub mod error_log;
pub mod invoice;
pub mod kit;
pub mod kit_registration;
pub mod lab;
pub mod notification;
pub mod order;
pub mod outbox_event;
pub mod payment;
pub mod quantity_discount;
pub mod role;
pub mod user;

pub use kit::KitType;
pub use kit_registration::KitStatus;
pub use order::{OrderStatus, PaymentStatus, StatusEntry, StatusHistory};
