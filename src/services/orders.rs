use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    db::conflict_on_unique,
    entities::{
        barcode, customer::{self, CustomerType}, invoice, kit_registration::{self, KitStatus}, lab,
        order::{self, OrderStatus, PaymentStatus, StatusEntry, StatusHistory},
        payment,
    },
    errors::{validate_in_order, FieldOrder, ServiceError},
    events::{Event, EventSender},
    services::{
        discounts, inventory, messages,
        payments::{return_urls, PaymentGateway, PaymentOrderRequest},
        pricing::{breakdown, price_order},
        reference_numbers,
        validation::{
            trim_optional, validate_gst_price, validate_product_image, validate_product_price,
            ADDRESS_RE, EMAIL_RE, NAME_RE, PHONE_RE, POSTCODE_RE, PRODUCT_NAME_RE,
        },
    },
};

pub const CLINIC_MIN_QUANTITY: i32 = 25;
const CLINIC_ID_MAX_LEN: usize = 100;

/// Checkout request from the storefront.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(
        length(min = 3, max = 50, message = "First name must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "First name must contain only letters and single spaces")
    )]
    pub first_name: String,
    #[validate(
        length(min = 3, max = 50, message = "Last name must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "Last name must contain only letters and single spaces")
    )]
    pub last_name: Option<String>,
    #[validate(
        length(max = 255, message = "Email cannot exceed 255 characters"),
        regex(path = "EMAIL_RE", message = "Invalid email format")
    )]
    pub email: String,
    #[validate(regex(path = "PHONE_RE", message = "Phone number must be 10 to 15 digits"))]
    pub phone_number: String,
    #[validate(
        length(min = 3, max = 50, message = "Country must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "Country must contain only letters and single spaces")
    )]
    pub country: String,
    #[validate(
        length(min = 5, max = 255, message = "Street address must be between 5 and 255 characters"),
        regex(path = "ADDRESS_RE", message = "Street address contains invalid characters")
    )]
    pub street_address: String,
    #[validate(
        length(min = 5, max = 100, message = "Town/City must be between 5 and 100 characters"),
        regex(path = "NAME_RE", message = "Town/City must contain only letters and single spaces")
    )]
    pub town_city: String,
    #[validate(
        length(min = 5, max = 100, message = "Region must be between 5 and 100 characters"),
        regex(path = "NAME_RE", message = "Region must contain only letters and single spaces")
    )]
    pub region: String,
    #[validate(
        length(min = 3, max = 20, message = "Postcode must be between 3 and 20 characters"),
        regex(path = "POSTCODE_RE", message = "Postcode may contain only letters, digits and '-'")
    )]
    pub postcode: String,
    #[validate(
        length(min = 3, max = 50, message = "Shipping country must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "Shipping country must contain only letters and single spaces")
    )]
    pub shipping_country: String,
    #[validate(
        length(min = 5, max = 255, message = "Shipping address must be between 5 and 255 characters"),
        regex(path = "ADDRESS_RE", message = "Shipping address contains invalid characters")
    )]
    pub shipping_address: String,
    #[validate(
        length(min = 5, max = 100, message = "Shipping town/city must be between 5 and 100 characters"),
        regex(path = "NAME_RE", message = "Shipping town/city must contain only letters and single spaces")
    )]
    pub shipping_town_city: String,
    #[validate(
        length(min = 5, max = 100, message = "Shipping region must be between 5 and 100 characters"),
        regex(path = "NAME_RE", message = "Shipping region must contain only letters and single spaces")
    )]
    pub shipping_region: String,
    #[validate(
        length(min = 3, max = 20, message = "Shipping postcode must be between 3 and 20 characters"),
        regex(path = "POSTCODE_RE", message = "Shipping postcode may contain only letters, digits and '-'")
    )]
    pub shipping_postcode: String,
    #[validate(
        length(min = 3, max = 100, message = "Product name must be between 3 and 100 characters"),
        regex(path = "PRODUCT_NAME_RE", message = "Product name contains invalid characters")
    )]
    pub product_name: String,
    #[validate(length(max = 1000, message = "Product description cannot exceed 1000 characters"))]
    pub product_description: Option<String>,
    #[validate(custom = "validate_product_image")]
    pub product_image: Option<String>,
    #[validate(custom = "validate_product_price")]
    pub product_price: Decimal,
    #[validate(custom = "validate_gst_price")]
    pub product_gst_price: Decimal,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    #[serde(rename = "type")]
    pub customer_type: String,
    pub clinic_id: Option<String>,
}

impl FieldOrder for CreateOrderRequest {
    const FIELD_ORDER: &'static [&'static str] = &[
        "first_name",
        "last_name",
        "email",
        "phone_number",
        "country",
        "street_address",
        "town_city",
        "region",
        "postcode",
        "shipping_country",
        "shipping_address",
        "shipping_town_city",
        "shipping_region",
        "shipping_postcode",
        "product_name",
        "product_description",
        "product_image",
        "product_price",
        "product_gst_price",
        "quantity",
    ];
}

impl CreateOrderRequest {
    /// Trims every string and lowercases `type`.
    pub fn normalized(self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: trim_optional(self.last_name),
            email: self.email.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            country: self.country.trim().to_string(),
            street_address: self.street_address.trim().to_string(),
            town_city: self.town_city.trim().to_string(),
            region: self.region.trim().to_string(),
            postcode: self.postcode.trim().to_string(),
            shipping_country: self.shipping_country.trim().to_string(),
            shipping_address: self.shipping_address.trim().to_string(),
            shipping_town_city: self.shipping_town_city.trim().to_string(),
            shipping_region: self.shipping_region.trim().to_string(),
            shipping_postcode: self.shipping_postcode.trim().to_string(),
            product_name: self.product_name.trim().to_string(),
            product_description: trim_optional(self.product_description),
            product_image: trim_optional(self.product_image),
            product_price: self.product_price,
            product_gst_price: self.product_gst_price,
            quantity: self.quantity,
            customer_type: self.customer_type.trim().to_lowercase(),
            clinic_id: trim_optional(self.clinic_id),
        }
    }

    /// Field validation followed by the customer-type quantity rules.
    pub fn check(&self) -> Result<CustomerType, ServiceError> {
        validate_in_order(self)?;

        let customer_type = CustomerType::from_str(&self.customer_type)
            .map_err(|_| ServiceError::ValidationError(messages::INVALID_CUSTOMER_TYPE.to_string()))?;

        match customer_type {
            CustomerType::Customer if self.quantity != 1 => Err(ServiceError::ValidationError(
                messages::CUSTOMER_QUANTITY.to_string(),
            )),
            CustomerType::Clinic if self.quantity < CLINIC_MIN_QUANTITY => Err(
                ServiceError::ValidationError(messages::CLINIC_QUANTITY.to_string()),
            ),
            CustomerType::Clinic => match self.clinic_id.as_deref() {
                None => Err(ServiceError::ValidationError(
                    messages::CLINIC_ID_REQUIRED.to_string(),
                )),
                Some(id) if id.chars().count() > CLINIC_ID_MAX_LEN => Err(
                    ServiceError::ValidationError(messages::CLINIC_ID_TOO_LONG.to_string()),
                ),
                Some(_) => Ok(customer_type),
            },
            CustomerType::Customer => Ok(customer_type),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    pub payment_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub order_status: Option<String>,
    pub payment_status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerSummary {
    pub id: i32,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub phone_number: String,
    pub customer_type: CustomerType,
    pub clinic_id: Option<String>,
}

impl From<&customer::Model> for CustomerSummary {
    fn from(c: &customer::Model) -> Self {
        Self {
            id: c.id,
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            email: c.email.clone(),
            phone_number: c.phone_number.clone(),
            customer_type: c.customer_type,
            clinic_id: c.clinic_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderListItem {
    pub id: i32,
    pub order_number: String,
    pub product_name: String,
    pub quantity: i32,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub tracking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub customer: Option<CustomerSummary>,
    pub barcode_count: usize,
    pub barcode_numbers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderCounts {
    pub pending: u64,
    pub processing: u64,
    pub dispatched: u64,
    pub shipped: u64,
    pub total_quantity: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvoiceSummary {
    pub invoice_id: String,
    pub invoice_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentSummary {
    pub id: i32,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub invoices: Vec<InvoiceSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LabSummary {
    pub id: i32,
    pub lab_name: String,
    pub lab_address: String,
    pub nhi_number: String,
}

impl From<lab::Model> for LabSummary {
    fn from(l: lab::Model) -> Self {
        Self {
            id: l.id,
            lab_name: l.lab_name,
            lab_address: l.lab_address,
            nhi_number: l.nhi_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BarcodeDetail {
    pub id: i32,
    pub barcode_number: String,
    pub kit_status: Option<KitStatus>,
    pub reason: Option<String>,
    pub file_path: Option<String>,
    pub lab: Option<LabSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    pub id: i32,
    pub order_number: String,
    pub product_name: String,
    pub product_description: Option<String>,
    pub product_image: Option<String>,
    pub product_price: Decimal,
    pub product_gst_price: Decimal,
    pub product_discount: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub order_status_history: Vec<StatusEntry>,
    pub tracking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub customer: Option<CustomerSummary>,
    pub payments: Vec<PaymentSummary>,
    pub barcodes: Vec<BarcodeDetail>,
}

/// Settings order creation needs from the application config.
#[derive(Debug, Clone)]
pub struct OrderSettings {
    pub order_number_prefix: String,
    pub app_url: String,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    settings: OrderSettings,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        settings: OrderSettings,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            gateway,
            settings,
            event_sender,
        }
    }

    /// Creates the order and its pending payment, and opens a payable order
    /// with the gateway. Nothing is persisted unless every step succeeds.
    #[instrument(skip(self, request), fields(email = %request.email, quantity = request.quantity))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        let request = request.normalized();
        let customer_type = request.check()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let customer = resolve_customer(&txn, &request, customer_type).await?;

        let available = inventory::available_saliva_stock(&txn).await?;
        if i64::from(request.quantity) > available {
            // Informational only; orders are accepted regardless of stock.
            warn!(
                requested = request.quantity,
                available, "order exceeds available saliva kit stock"
            );
        }

        let discount_pct = discounts::resolve(&txn, request.quantity).await?;
        let pricing = price_order(
            request.product_price,
            request.product_gst_price,
            discount_pct,
            request.quantity,
        );

        let order_number =
            reference_numbers::allocate_order_number(&txn, &self.settings.order_number_prefix)
                .await?;
        let now = Utc::now();
        let order = order::ActiveModel {
            customer_id: Set(customer.id),
            product_name: Set(request.product_name.clone()),
            product_description: Set(request.product_description.clone()),
            product_image: Set(request.product_image.clone()),
            product_price: Set(pricing.base_price),
            product_gst_price: Set(pricing.gst_price),
            product_discount: Set(pricing.discount_pct),
            quantity: Set(request.quantity),
            order_number: Set(order_number),
            total_price: Set(pricing.total_price),
            payment_status: Set(PaymentStatus::Pending),
            order_status: Set(OrderStatus::Pending),
            order_status_history: Set(StatusHistory::starting_at(OrderStatus::Pending, now)),
            tracking_id: Set(None),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| conflict_on_unique(e, messages::ORDER_NUMBER_EXHAUSTED))?;

        let payment = payment::ActiveModel {
            order_id: Set(order.id),
            payment_status: Set(PaymentStatus::Pending),
            transaction_id: Set(None),
            amount: Set(order.total_price),
            product_gst_price: Set(order.product_gst_price),
            product_discount: Set(order.product_discount),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let (return_url, cancel_url) = return_urls(&self.settings.app_url, payment.id);
        let gateway_order = self
            .gateway
            .create_order(&PaymentOrderRequest {
                payment_id: payment.id,
                order_id: order.id,
                product_name: order.product_name.clone(),
                product_description: order.product_description.clone(),
                gst_price: order.product_gst_price,
                breakdown: breakdown(
                    order.product_price,
                    order.product_gst_price,
                    order.product_discount,
                    order.quantity,
                ),
                return_url,
                cancel_url,
            })
            .await?;

        let payment_id = payment.id;
        let mut payment: payment::ActiveModel = payment.into();
        payment.transaction_id = Set(Some(gateway_order.id));
        payment.update(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit order {}: {}", order.id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = order.id,
            order_number = %order.order_number,
            total = %order.total_price,
            "order created"
        );
        if let Some(sender) = &self.event_sender {
            sender
                .publish(Event::OrderCreated {
                    order_id: order.id,
                    payment_id,
                })
                .await;
        }

        Ok(CreateOrderResponse {
            payment_url: gateway_order.approval_url,
        })
    }

    /// Dashboard counts over paid orders.
    #[instrument(skip(self))]
    pub async fn counts(&self) -> Result<OrderCounts, ServiceError> {
        let db = &*self.db;
        let paid = || {
            order::Entity::find()
                .filter(order::Column::IsDeleted.eq(false))
                .filter(order::Column::PaymentStatus.eq(PaymentStatus::Completed))
        };
        let count_in = |status: OrderStatus| {
            paid()
                .filter(order::Column::OrderStatus.eq(status))
                .count(db)
        };

        let total_quantity: Option<i64> = paid()
            .select_only()
            .column_as(order::Column::Quantity.sum(), "total")
            .into_tuple()
            .one(db)
            .await?
            .flatten();

        Ok(OrderCounts {
            pending: count_in(OrderStatus::Pending).await?,
            processing: count_in(OrderStatus::Processing).await?,
            dispatched: count_in(OrderStatus::Dispatched).await?,
            shipped: count_in(OrderStatus::Shipped).await?,
            total_quantity: total_quantity.unwrap_or(0),
        })
    }

    /// Orders newest first with their customer and barcodes.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        filter: OrderFilter,
    ) -> Result<(Vec<OrderListItem>, u64), ServiceError> {
        let db = &*self.db;
        let mut query = order::Entity::find().filter(order::Column::IsDeleted.eq(false));

        if let Some(status) = filter.order_status.as_deref().filter(|s| !s.is_empty()) {
            let status = OrderStatus::from_str(status)
                .map_err(|_| ServiceError::ValidationError(messages::INVALID_ORDER_STATUS.to_string()))?;
            query = query.filter(order::Column::OrderStatus.eq(status));
        }
        if let Some(status) = filter.payment_status.as_deref().filter(|s| !s.is_empty()) {
            let status = parse_payment_status(status)?;
            query = query.filter(order::Column::PaymentStatus.eq(status));
        }
        if let Some(term) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", term);
            let customer_ids: Vec<i32> = customer::Entity::find()
                .filter(
                    Condition::any()
                        .add(customer::Column::Email.like(pattern.as_str()))
                        .add(customer::Column::FirstName.like(pattern.as_str()))
                        .add(customer::Column::LastName.like(pattern.as_str())),
                )
                .select_only()
                .column(customer::Column::Id)
                .into_tuple()
                .all(db)
                .await?;
            query = query.filter(
                Condition::any()
                    .add(order::Column::OrderNumber.like(pattern.as_str()))
                    .add(order::Column::ProductName.like(pattern.as_str()))
                    .add(order::Column::CustomerId.is_in(customer_ids)),
            );
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let customers: HashMap<i32, customer::Model> = customer::Entity::find()
            .filter(customer::Column::Id.is_in(orders.iter().map(|o| o.customer_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let mut barcodes: HashMap<i32, Vec<String>> = HashMap::new();
        for b in barcode::Entity::find()
            .filter(barcode::Column::OrderId.is_in(orders.iter().map(|o| o.id)))
            .filter(barcode::Column::IsDeleted.eq(false))
            .order_by_asc(barcode::Column::Id)
            .all(db)
            .await?
        {
            barcodes.entry(b.order_id).or_default().push(b.barcode_number);
        }

        let items = orders
            .into_iter()
            .map(|o| {
                let barcode_numbers = barcodes.remove(&o.id).unwrap_or_default();
                OrderListItem {
                    id: o.id,
                    customer: customers.get(&o.customer_id).map(CustomerSummary::from),
                    order_number: o.order_number,
                    product_name: o.product_name,
                    quantity: o.quantity,
                    total_price: o.total_price,
                    payment_status: o.payment_status,
                    order_status: o.order_status,
                    tracking_id: o.tracking_id,
                    created_at: o.created_at,
                    barcode_count: barcode_numbers.len(),
                    barcode_numbers,
                }
            })
            .collect();
        Ok((items, total))
    }

    /// Full order view with payments, invoices, barcodes and kit status.
    #[instrument(skip(self))]
    pub async fn detail(&self, order_id: i32) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .filter(|o| !o.is_deleted)
            .ok_or_else(|| ServiceError::NotFound(messages::ORDER_NOT_FOUND.to_string()))?;

        let customer = customer::Entity::find_by_id(order.customer_id).one(db).await?;

        let payments = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::IsDeleted.eq(false))
            .order_by_asc(payment::Column::Id)
            .all(db)
            .await?;
        let mut invoices: HashMap<i32, Vec<InvoiceSummary>> = HashMap::new();
        for inv in invoice::Entity::find()
            .filter(invoice::Column::PaymentId.is_in(payments.iter().map(|p| p.id)))
            .filter(invoice::Column::IsDeleted.eq(false))
            .all(db)
            .await?
        {
            invoices.entry(inv.payment_id).or_default().push(InvoiceSummary {
                invoice_id: inv.invoice_id,
                invoice_link: inv.invoice_link,
                created_at: inv.created_at,
            });
        }

        let barcodes = barcode::Entity::find()
            .filter(barcode::Column::OrderId.eq(order.id))
            .filter(barcode::Column::IsDeleted.eq(false))
            .order_by_asc(barcode::Column::Id)
            .all(db)
            .await?;
        let registrations: HashMap<i32, kit_registration::Model> = kit_registration::Entity::find()
            .filter(kit_registration::Column::OrderId.eq(order.id))
            .filter(kit_registration::Column::IsDeleted.eq(false))
            .all(db)
            .await?
            .into_iter()
            .map(|r| (r.barcode_id, r))
            .collect();
        let labs: HashMap<i32, lab::Model> = lab::Entity::find()
            .filter(lab::Column::Id.is_in(registrations.values().filter_map(|r| r.lab_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|l| (l.id, l))
            .collect();

        Ok(OrderDetail {
            id: order.id,
            customer: customer.as_ref().map(CustomerSummary::from),
            payments: payments
                .into_iter()
                .map(|p| PaymentSummary {
                    invoices: invoices.remove(&p.id).unwrap_or_default(),
                    id: p.id,
                    payment_status: p.payment_status,
                    transaction_id: p.transaction_id,
                    amount: p.amount,
                    created_at: p.created_at,
                })
                .collect(),
            barcodes: barcodes
                .into_iter()
                .map(|b| {
                    let registration = registrations.get(&b.id);
                    BarcodeDetail {
                        id: b.id,
                        barcode_number: b.barcode_number,
                        kit_status: registration.map(|r| r.kit_status),
                        reason: registration.and_then(|r| r.reason.clone()),
                        file_path: registration.and_then(|r| r.file_path.clone()),
                        lab: registration
                            .and_then(|r| r.lab_id)
                            .and_then(|id| labs.get(&id).cloned())
                            .map(LabSummary::from),
                    }
                })
                .collect(),
            order_status_history: order.order_status_history.0,
            order_number: order.order_number,
            product_name: order.product_name,
            product_description: order.product_description,
            product_image: order.product_image,
            product_price: order.product_price,
            product_gst_price: order.product_gst_price,
            product_discount: order.product_discount,
            quantity: order.quantity,
            total_price: order.total_price,
            payment_status: order.payment_status,
            order_status: order.order_status,
            tracking_id: order.tracking_id,
            created_at: order.created_at,
        })
    }
}

fn parse_payment_status(value: &str) -> Result<PaymentStatus, ServiceError> {
    match value.to_ascii_lowercase().as_str() {
        "pending" => Ok(PaymentStatus::Pending),
        "completed" => Ok(PaymentStatus::Completed),
        "failed" => Ok(PaymentStatus::Failed),
        "cancelled" => Ok(PaymentStatus::Cancelled),
        _ => Err(ServiceError::ValidationError(
            "Invalid payment status".to_string(),
        )),
    }
}

/// Finds the customer for the request's email or creates one. An email
/// bound to a clinic only orders under that clinic, and an email that is not
/// clinic-bound cannot be turned into one.
async fn resolve_customer(
    txn: &DatabaseTransaction,
    request: &CreateOrderRequest,
    customer_type: CustomerType,
) -> Result<customer::Model, ServiceError> {
    let existing = customer::Entity::find()
        .filter(customer::Column::Email.eq(request.email.as_str()))
        .one(txn)
        .await?;

    if let Some(existing) = existing {
        return match (existing.bound_clinic(), request.clinic_id.as_deref()) {
            (Some(_), None) => Err(ServiceError::BadRequest(
                messages::CLINIC_ID_MISSING_FOR_BOUND_EMAIL.to_string(),
            )),
            (Some(bound), Some(requested)) if bound != requested => Err(
                ServiceError::BadRequest(messages::CLINIC_ID_MISMATCH.to_string()),
            ),
            (None, Some(_)) => Err(ServiceError::BadRequest(
                messages::EMAIL_NOT_CLINIC.to_string(),
            )),
            _ => Ok(existing),
        };
    }

    let now = Utc::now();
    let created = customer::ActiveModel {
        first_name: Set(request.first_name.clone()),
        last_name: Set(request.last_name.clone()),
        email: Set(request.email.clone()),
        phone_number: Set(request.phone_number.clone()),
        country: Set(request.country.clone()),
        street_address: Set(request.street_address.clone()),
        town_city: Set(request.town_city.clone()),
        region: Set(request.region.clone()),
        postcode: Set(request.postcode.clone()),
        shipping_country: Set(request.shipping_country.clone()),
        shipping_address: Set(request.shipping_address.clone()),
        shipping_town_city: Set(request.shipping_town_city.clone()),
        shipping_region: Set(request.shipping_region.clone()),
        shipping_postcode: Set(request.shipping_postcode.clone()),
        customer_type: Set(customer_type),
        clinic_id: Set(request.clinic_id.clone()),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(|e| conflict_on_unique(e, "A customer with this email is being created, please retry"))?;

    info!(customer_id = created.id, "customer created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use crate::services::test_support::{seed_customer, FakeGateway};
    use rust_decimal_macros::dec;

    fn request(email: &str, customer_type: &str, quantity: i32, clinic_id: Option<&str>) -> CreateOrderRequest {
        CreateOrderRequest {
            first_name: " Jane ".into(),
            last_name: Some("Doe".into()),
            email: email.into(),
            phone_number: "0211234567".into(),
            country: "New Zealand".into(),
            street_address: "1 Queen Street".into(),
            town_city: "Auckland".into(),
            region: "Auckland".into(),
            postcode: "1010".into(),
            shipping_country: "New Zealand".into(),
            shipping_address: "1 Queen Street".into(),
            shipping_town_city: "Auckland".into(),
            shipping_region: "Auckland".into(),
            shipping_postcode: "1010".into(),
            product_name: "DNA Kit".into(),
            product_description: None,
            product_image: None,
            product_price: dec!(50),
            product_gst_price: dec!(5),
            quantity,
            customer_type: customer_type.into(),
            clinic_id: clinic_id.map(str::to_string),
        }
    }

    fn service(db: Arc<DatabaseConnection>, gateway: Arc<FakeGateway>) -> OrderService {
        OrderService::new(
            db,
            gateway,
            OrderSettings {
                order_number_prefix: "SL".into(),
                app_url: "https://app.example.com".into(),
            },
            None,
        )
    }

    #[test]
    fn customer_orders_are_single_kit() {
        let req = request("a@x.com", "customer", 2, None).normalized();
        assert!(matches!(req.check(), Err(ServiceError::ValidationError(m)) if m == messages::CUSTOMER_QUANTITY));
    }

    #[test]
    fn clinic_orders_need_bulk_quantity_and_id() {
        let small = request("a@x.com", "clinic", 24, Some("C1")).normalized();
        assert!(matches!(small.check(), Err(ServiceError::ValidationError(m)) if m == messages::CLINIC_QUANTITY));

        let no_id = request("a@x.com", "Clinic", 25, Some("  ")).normalized();
        assert!(matches!(no_id.check(), Err(ServiceError::ValidationError(m)) if m == messages::CLINIC_ID_REQUIRED));

        let ok = request("a@x.com", "CLINIC", 25, Some("C1")).normalized();
        assert_eq!(ok.check().unwrap(), CustomerType::Clinic);
    }

    #[test]
    fn field_rules_reject_bad_input() {
        let mut req = request("not-an-email", "customer", 1, None);
        assert!(req.clone().normalized().check().is_err());

        req.email = "a@x.com".into();
        req.phone_number = "12345".into();
        assert!(matches!(
            req.clone().normalized().check(),
            Err(ServiceError::ValidationError(m)) if m == "Phone number must be 10 to 15 digits"
        ));

        req.phone_number = "0211234567".into();
        req.product_gst_price = Decimal::ZERO;
        assert!(req.normalized().check().is_err());
    }

    #[test]
    fn first_invalid_field_in_form_order_is_reported() {
        let mut req = request("not-an-email", "customer", 1, None);
        req.first_name = "J".into();
        assert!(matches!(
            req.clone().normalized().check(),
            Err(ServiceError::ValidationError(m)) if m == "First name must be between 3 and 50 characters"
        ));

        let mut req = request("a@x.com", "customer", 1, None);
        req.phone_number = "123".into();
        req.country = "NZ".into();
        assert!(matches!(
            req.normalized().check(),
            Err(ServiceError::ValidationError(m)) if m == "Phone number must be 10 to 15 digits"
        ));
    }

    #[tokio::test]
    async fn creates_priced_order_and_pending_payment() {
        let db = Arc::new(memory_db().await);
        let gateway = Arc::new(FakeGateway::capturing("COMPLETED"));
        let svc = service(db.clone(), gateway.clone());

        let response = svc
            .create_order(request("clinic@x.com", "clinic", 100, Some("C1")))
            .await
            .unwrap();
        assert!(response.payment_url.starts_with("https://pay.example/approve/"));

        let order = order::Entity::find().one(&*db).await.unwrap().unwrap();
        assert_eq!(order.product_price, dec!(45));
        assert_eq!(order.product_discount, dec!(15));
        assert_eq!(order.total_price, dec!(4325));
        assert_eq!(order.order_status, OrderStatus::Pending);
        assert_eq!(order.order_status_history.len(), 1);
        assert!(order.order_number.starts_with("SL-"));

        let payment = payment::Entity::find().one(&*db).await.unwrap().unwrap();
        assert_eq!(payment.payment_status, PaymentStatus::Pending);
        assert_eq!(payment.transaction_id, Some(format!("PP-{}", payment.id)));

        let sent = gateway.created.lock().unwrap();
        assert_eq!(sent[0].breakdown.total, dec!(4325.00));
        assert!(sent[0].return_url.ends_with(&format!("payment_id={}&action=success", payment.id)));
    }

    #[tokio::test]
    async fn gateway_failure_rolls_everything_back() {
        let db = Arc::new(memory_db().await);
        let svc = service(db.clone(), Arc::new(FakeGateway::unavailable()));

        let result = svc.create_order(request("a@x.com", "customer", 1, None)).await;
        assert!(matches!(result, Err(ServiceError::ExternalServiceError(_))));
        assert_eq!(order::Entity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(payment::Entity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(customer::Entity::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clinic_binding_is_enforced_per_email() {
        let db = Arc::new(memory_db().await);
        seed_customer(&db, "a@x.com", Some("C1")).await;
        seed_customer(&db, "retail@x.com", None).await;
        let svc = service(db.clone(), Arc::new(FakeGateway::capturing("COMPLETED")));

        let missing = svc.create_order(request("a@x.com", "customer", 1, None)).await;
        assert!(matches!(missing, Err(ServiceError::BadRequest(m)) if m == messages::CLINIC_ID_MISSING_FOR_BOUND_EMAIL));

        let other = svc.create_order(request("a@x.com", "clinic", 25, Some("C2"))).await;
        assert!(matches!(other, Err(ServiceError::BadRequest(m)) if m == messages::CLINIC_ID_MISMATCH));

        let converted = svc
            .create_order(request("retail@x.com", "clinic", 25, Some("C9")))
            .await;
        assert!(matches!(converted, Err(ServiceError::BadRequest(m)) if m == messages::EMAIL_NOT_CLINIC));

        svc.create_order(request("a@x.com", "clinic", 25, Some("C1")))
            .await
            .unwrap();
        svc.create_order(request("retail@x.com", "customer", 1, None))
            .await
            .unwrap();
        assert_eq!(order::Entity::find().count(&*db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn counts_and_list_cover_paid_orders() {
        use crate::services::test_support::{add_barcodes, barcode_number, seed_paid_order};
        let db = Arc::new(memory_db().await);
        let a = seed_paid_order(&db, 2, OrderStatus::Pending).await;
        seed_paid_order(&db, 3, OrderStatus::Processing).await;
        crate::services::test_support::seed_order(&db, 5, None).await;
        add_barcodes(&db, a.id, &[barcode_number(1)]).await;

        let svc = service(db.clone(), Arc::new(FakeGateway::capturing("COMPLETED")));
        let counts = svc.counts().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total_quantity, 5);

        let (items, total) = svc.list(1, 10, OrderFilter::default()).await.unwrap();
        assert_eq!(total, 3);
        let first = items.iter().find(|i| i.id == a.id).unwrap();
        assert_eq!(first.barcode_count, 1);

        let detail = svc.detail(a.id).await.unwrap();
        assert_eq!(detail.barcodes.len(), 1);
        assert_eq!(detail.payments.len(), 1);
        assert!(matches!(svc.detail(9999).await, Err(ServiceError::NotFound(_))));
    }
}
