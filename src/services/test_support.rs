//! Fixtures shared by service tests.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::entities::{
    barcode,
    customer::{self, CustomerType},
    order::{self, OrderStatus, PaymentStatus, StatusHistory},
    payment,
};
use crate::errors::ServiceError;
use crate::services::payments::{CaptureOutcome, PaymentGateway, PaymentOrder, PaymentOrderRequest};

pub(crate) struct FakeGateway {
    capture_status: String,
    pub(crate) created: Mutex<Vec<PaymentOrderRequest>>,
    pub(crate) captures: AtomicUsize,
    fail_create: bool,
}

impl FakeGateway {
    pub(crate) fn capturing(status: &str) -> Self {
        Self {
            capture_status: status.to_string(),
            created: Mutex::new(Vec::new()),
            captures: AtomicUsize::new(0),
            fail_create: false,
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            fail_create: true,
            ..Self::capturing("COMPLETED")
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentOrder, ServiceError> {
        if self.fail_create {
            return Err(ServiceError::ExternalServiceError("gateway down".into()));
        }
        self.created.lock().unwrap().push(request.clone());
        Ok(PaymentOrder {
            id: format!("PP-{}", request.payment_id),
            approval_url: format!("https://pay.example/approve/{}", request.payment_id),
        })
    }

    async fn capture_order(&self, _gateway_order_id: &str) -> Result<CaptureOutcome, ServiceError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(CaptureOutcome {
            status: self.capture_status.clone(),
            detail: None,
        })
    }
}

static NEXT: AtomicUsize = AtomicUsize::new(1);

fn next_id() -> usize {
    NEXT.fetch_add(1, Ordering::SeqCst)
}

/// A valid 30 character barcode derived from `n`.
pub(crate) fn barcode_number(n: usize) -> String {
    format!("{:0>30}", n)
}

pub(crate) async fn seed_customer(
    db: &DatabaseConnection,
    email: &str,
    clinic_id: Option<&str>,
) -> customer::Model {
    let now = Utc::now();
    customer::ActiveModel {
        first_name: Set("Jane".into()),
        last_name: Set(Some("Doe".into())),
        email: Set(email.into()),
        phone_number: Set("0211234567".into()),
        country: Set("New Zealand".into()),
        street_address: Set("1 Queen Street".into()),
        town_city: Set("Auckland".into()),
        region: Set("Auckland".into()),
        postcode: Set("1010".into()),
        shipping_country: Set("New Zealand".into()),
        shipping_address: Set("1 Queen Street".into()),
        shipping_town_city: Set("Auckland".into()),
        shipping_region: Set("Auckland".into()),
        shipping_postcode: Set("1010".into()),
        customer_type: Set(if clinic_id.is_some() {
            CustomerType::Clinic
        } else {
            CustomerType::Customer
        }),
        clinic_id: Set(clinic_id.map(str::to_string)),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

/// An order with a pending payment.
pub(crate) async fn seed_order(
    db: &DatabaseConnection,
    quantity: i32,
    transaction_id: Option<&str>,
) -> (order::Model, payment::Model) {
    let now = Utc::now();
    let n = next_id();
    let email = format!("buyer{}@example.com", n);
    let customer = seed_customer(db, &email, None).await;
    let order = order::ActiveModel {
        customer_id: Set(customer.id),
        product_name: Set("DNA Kit".into()),
        product_description: Set(None),
        product_image: Set(None),
        product_price: Set(dec!(45.00)),
        product_gst_price: Set(dec!(5.00)),
        product_discount: Set(dec!(0)),
        quantity: Set(quantity),
        order_number: Set(format!("SL-20250101-{:04}", n % 10_000)),
        total_price: Set(dec!(50.00) * rust_decimal::Decimal::from(quantity)),
        payment_status: Set(PaymentStatus::Pending),
        order_status: Set(OrderStatus::Pending),
        order_status_history: Set(StatusHistory::starting_at(OrderStatus::Pending, now)),
        tracking_id: Set(None),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    let payment = payment::ActiveModel {
        order_id: Set(order.id),
        payment_status: Set(PaymentStatus::Pending),
        transaction_id: Set(transaction_id.map(str::to_string)),
        amount: Set(order.total_price),
        product_gst_price: Set(order.product_gst_price),
        product_discount: Set(order.product_discount),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap();

    (order, payment)
}

/// An order whose payment has completed, in `status`.
pub(crate) async fn seed_paid_order(
    db: &DatabaseConnection,
    quantity: i32,
    status: OrderStatus,
) -> order::Model {
    let (order, payment) = seed_order(db, quantity, Some("PP-paid")).await;

    let mut payment: payment::ActiveModel = payment.into();
    payment.payment_status = Set(PaymentStatus::Completed);
    payment.update(db).await.unwrap();

    let history = order.order_status_history.appended(status, Utc::now());
    let mut active: order::ActiveModel = order.into();
    active.payment_status = Set(PaymentStatus::Completed);
    if status != OrderStatus::Pending {
        active.order_status = Set(status);
        active.order_status_history = Set(history);
    }
    active.update(db).await.unwrap()
}

pub(crate) async fn add_barcodes(
    db: &DatabaseConnection,
    order_id: i32,
    numbers: &[String],
) -> Vec<barcode::Model> {
    let mut out = Vec::new();
    for number in numbers {
        let now = Utc::now();
        out.push(
            barcode::ActiveModel {
                order_id: Set(order_id),
                barcode_number: Set(number.clone()),
                is_deleted: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await
            .unwrap(),
        );
    }
    out
}
