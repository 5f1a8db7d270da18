use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QuerySelect, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    db::conflict_on_unique,
    entities::{
        customer::Entity as CustomerEntity,
        invoice,
        order::{self, Entity as OrderEntity, OrderStatus, PaymentStatus},
        payment::{self, Entity as PaymentEntity},
        role,
    },
    errors::ServiceError,
    events::{outbox, Event, EventSender},
    services::{
        messages,
        notifications::{notify_roles, NotificationDraft, TYPE_ORDER_PURCHASE},
        pricing::Breakdown,
        reference_numbers,
    },
};

/// What the gateway needs to create a payable order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrderRequest {
    pub payment_id: i32,
    pub order_id: i32,
    pub product_name: String,
    pub product_description: Option<String>,
    pub gst_price: Decimal,
    pub breakdown: Breakdown,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOrder {
    /// Gateway order id, stored as the payment's transaction id.
    pub id: String,
    pub approval_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub status: String,
    pub detail: Option<String>,
}

impl CaptureOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

/// External payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentOrder, ServiceError>;

    /// Captures an approved order. Transport failures are errors; a capture
    /// the gateway declined is an outcome that is not completed.
    async fn capture_order(&self, gateway_order_id: &str) -> Result<CaptureOutcome, ServiceError>;
}

/// Return and cancel URLs handed to the gateway for `payment_id`.
pub fn return_urls(app_url: &str, payment_id: i32) -> (String, String) {
    let base = app_url.trim_end_matches('/');
    (
        format!("{}/payment-status?payment_id={}&action=success", base, payment_id),
        format!("{}/payment-status?payment_id={}&action=cancel", base, payment_id),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub action: String,
    pub status: CallbackStatus,
    pub message: String,
    /// Set when capture was attempted and the gateway did not complete it.
    pub gateway_error: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Settles a payment from the gateway redirect. A payment settles once;
    /// later callbacks for it are conflicts.
    #[instrument(skip(self, token), fields(payment_id = payment_id, action = %action))]
    pub async fn handle_callback(
        &self,
        payment_id: i32,
        token: &str,
        action: &str,
    ) -> Result<CallbackOutcome, ServiceError> {
        let action = action.trim().to_lowercase();
        let payment = find_payment(&*self.db, payment_id, false).await?;
        if payment.payment_status.is_terminal() {
            return Err(ServiceError::Conflict(
                messages::PAYMENT_ALREADY_PROCESSED.to_string(),
            ));
        }

        match action.as_str() {
            "success" => self.capture(payment, token, action).await,
            "cancel" => {
                self.close(payment_id, PaymentStatus::Cancelled, OrderStatus::Cancelled)
                    .await?;
                Ok(CallbackOutcome {
                    action,
                    status: CallbackStatus::Cancelled,
                    message: messages::PAYMENT_CANCELLED.to_string(),
                    gateway_error: None,
                })
            }
            _ => {
                self.close(payment_id, PaymentStatus::Failed, OrderStatus::Failed)
                    .await?;
                Ok(CallbackOutcome {
                    action,
                    status: CallbackStatus::Failed,
                    message: messages::PAYMENT_FAILED.to_string(),
                    gateway_error: None,
                })
            }
        }
    }

    async fn capture(
        &self,
        payment: payment::Model,
        token: &str,
        action: String,
    ) -> Result<CallbackOutcome, ServiceError> {
        let gateway_order_id = match payment.transaction_id.as_deref() {
            Some(stored) if stored != token => {
                warn!(payment_id = payment.id, "callback token does not match gateway order");
                return Err(ServiceError::BadRequest(
                    "Payment token does not match this payment".to_string(),
                ));
            }
            Some(stored) => stored.to_string(),
            None => token.to_string(),
        };

        let failure = match self.gateway.capture_order(&gateway_order_id).await {
            Ok(outcome) if outcome.is_completed() => None,
            Ok(outcome) => Some(outcome.detail.unwrap_or_else(|| {
                format!("Payment capture returned status {}", outcome.status)
            })),
            Err(e) => Some(e.response_message()),
        };

        if let Some(reason) = failure {
            warn!(payment_id = payment.id, "payment capture failed: {}", reason);
            self.close(payment.id, PaymentStatus::Failed, OrderStatus::Failed)
                .await?;
            return Ok(CallbackOutcome {
                action,
                status: CallbackStatus::Failed,
                message: reason.clone(),
                gateway_error: Some(reason),
            });
        }

        self.record_capture(payment.id).await.map_err(|e| {
            // Money has moved; this needs manual reconciliation.
            error!(
                payment_id = payment.id,
                gateway_order_id = %gateway_order_id,
                "captured payment could not be recorded: {}",
                e
            );
            e
        })?;

        Ok(CallbackOutcome {
            action,
            status: CallbackStatus::Completed,
            message: messages::PAYMENT_COMPLETED.to_string(),
            gateway_error: None,
        })
    }

    /// Marks the payment completed, issues the invoice row and queues the
    /// confirmation work. The order stays `Pending` until kits are assigned.
    async fn record_capture(&self, payment_id: i32) -> Result<String, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let payment = find_payment(&txn, payment_id, true).await?;
        if payment.payment_status.is_terminal() {
            return Err(ServiceError::Conflict(
                messages::PAYMENT_ALREADY_PROCESSED.to_string(),
            ));
        }
        let order = lock_order(&txn, payment.order_id).await?;
        let customer = CustomerEntity::find_by_id(order.customer_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))?;

        let now = Utc::now();
        let mut payment_active: payment::ActiveModel = payment.into();
        payment_active.payment_status = Set(PaymentStatus::Completed);
        payment_active.updated_at = Set(now);
        payment_active.update(&txn).await?;

        let mut order_active: order::ActiveModel = order.clone().into();
        order_active.payment_status = Set(PaymentStatus::Completed);
        order_active.updated_at = Set(now);
        order_active.update(&txn).await?;

        let invoice_id = reference_numbers::allocate_invoice_id(&txn).await?;
        invoice::ActiveModel {
            payment_id: Set(payment_id),
            invoice_id: Set(invoice_id.clone()),
            invoice_link: Set(None),
            price: Set(order.product_price),
            product_gst_price: Set(order.product_gst_price),
            product_discount: Set(order.product_discount),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| conflict_on_unique(e, messages::PAYMENT_ALREADY_PROCESSED))?;

        let draft = NotificationDraft::for_order(
            "New Order Received",
            format!(
                "{} has placed a new order for {} units of {}, totaling ${:.2}.",
                customer.full_name(),
                order.quantity,
                order.product_name,
                order.total_price
            ),
            TYPE_ORDER_PURCHASE,
            customer.full_name(),
            order.id,
            &order.order_status.to_string(),
            &order.order_number,
        );
        notify_roles(&txn, &role::STAFF_ROLES, &draft).await?;
        outbox::enqueue(&txn, outbox::OutboxMessage::payment_confirmed(payment_id)).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit payment {}: {}", payment_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(payment_id, order_id = order.id, %invoice_id, "payment completed");
        self.publish(Event::PaymentCompleted {
            payment_id,
            order_id: order.id,
            invoice_id: invoice_id.clone(),
        })
        .await;
        Ok(invoice_id)
    }

    /// Moves a pending payment and its order to a terminal state.
    async fn close(
        &self,
        payment_id: i32,
        payment_status: PaymentStatus,
        order_status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let payment = find_payment(&txn, payment_id, true).await?;
        if payment.payment_status.is_terminal() {
            return Err(ServiceError::Conflict(
                messages::PAYMENT_ALREADY_PROCESSED.to_string(),
            ));
        }
        let order = lock_order(&txn, payment.order_id).await?;
        let order_id = order.id;

        let now = Utc::now();
        let mut payment_active: payment::ActiveModel = payment.into();
        payment_active.payment_status = Set(payment_status);
        payment_active.updated_at = Set(now);
        payment_active.update(&txn).await?;

        apply_order_status(&txn, order, Some(payment_status), order_status, None).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit payment {}: {}", payment_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(payment_id, order_id, %payment_status, "payment closed");
        let event = match payment_status {
            PaymentStatus::Cancelled => Event::PaymentCancelled {
                payment_id,
                order_id,
            },
            _ => Event::PaymentFailed {
                payment_id,
                order_id,
            },
        };
        self.publish(event).await;
        Ok(())
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.publish(event).await;
        }
    }
}

async fn find_payment<C: ConnectionTrait>(
    conn: &C,
    payment_id: i32,
    lock: bool,
) -> Result<payment::Model, ServiceError> {
    let mut query = PaymentEntity::find_by_id(payment_id);
    if lock {
        query = query.lock_exclusive();
    }
    query
        .one(conn)
        .await
        .map_err(|e| {
            error!("Failed to fetch payment {}: {}", payment_id, e);
            ServiceError::DatabaseError(e)
        })?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| ServiceError::NotFound(messages::PAYMENT_NOT_FOUND.to_string()))
}

/// Loads a non-deleted order with a row lock for the rest of the transaction.
pub(crate) async fn lock_order(
    txn: &DatabaseTransaction,
    order_id: i32,
) -> Result<order::Model, ServiceError> {
    OrderEntity::find_by_id(order_id)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(|e| {
            error!("Failed to fetch order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?
        .filter(|o| !o.is_deleted)
        .ok_or_else(|| ServiceError::NotFound(messages::ORDER_NOT_FOUND.to_string()))
}

/// Writes a new order status and appends it to the history.
pub(crate) async fn apply_order_status(
    txn: &DatabaseTransaction,
    order: order::Model,
    payment_status: Option<PaymentStatus>,
    order_status: OrderStatus,
    tracking_id: Option<String>,
) -> Result<order::Model, ServiceError> {
    let now = Utc::now();
    let history = order.order_status_history.appended(order_status, now);
    let mut active: order::ActiveModel = order.into();
    if let Some(status) = payment_status {
        active.payment_status = Set(status);
    }
    active.order_status = Set(order_status);
    active.order_status_history = Set(history);
    if let Some(tracking) = tracking_id {
        active.tracking_id = Set(Some(tracking));
    }
    active.updated_at = Set(now);
    Ok(active.update(txn).await?)
}
