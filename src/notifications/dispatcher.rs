use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{templates, EmailMessage, Mailer};
use crate::errors::ServiceError;
use crate::events::outbox::{self, OutboxHandler, OutboxMessage, EVENT_EMAIL, EVENT_PAYMENT_CONFIRMED};
use crate::services::invoices::InvoiceService;

#[derive(Debug, Deserialize)]
struct PaymentConfirmed {
    payment_id: i32,
}

/// Executes outbox rows. Emails go straight to the mailer. A confirmed
/// payment renders its invoice and then queues the two order emails as
/// separate rows so a relay failure never resends the one already delivered.
pub struct NotificationDispatcher {
    db: Arc<DatabaseConnection>,
    mailer: Arc<dyn Mailer>,
    invoices: InvoiceService,
    client_email: Option<String>,
}

impl NotificationDispatcher {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mailer: Arc<dyn Mailer>,
        invoices: InvoiceService,
        client_email: Option<String>,
    ) -> Self {
        Self {
            db,
            mailer,
            invoices,
            client_email,
        }
    }

    async fn send_email(&self, payload: &Value) -> Result<(), ServiceError> {
        let message: EmailMessage = serde_json::from_value(payload.clone())
            .map_err(|e| ServiceError::InternalError(format!("Malformed email payload: {}", e)))?;
        self.mailer
            .send(&message)
            .await
            .map_err(|e| ServiceError::ExternalServiceError(e.to_string()))
    }

    #[instrument(skip(self, payload))]
    async fn payment_confirmed(&self, payload: &Value) -> Result<(), ServiceError> {
        let event: PaymentConfirmed = serde_json::from_value(payload.clone())
            .map_err(|e| ServiceError::InternalError(format!("Malformed payment payload: {}", e)))?;
        let bundle = self.invoices.render_for_payment(event.payment_id).await?;
        let customer_name = bundle.customer.full_name();

        let confirmation = EmailMessage::new(
            bundle.customer.email.clone(),
            "Order Confirmation",
            templates::order_confirmation(
                &customer_name,
                &bundle.order.order_number,
                &bundle.order.product_name,
                &bundle.breakdown,
                Some(&bundle.invoice_link),
            ),
        );
        outbox::enqueue(
            &*self.db,
            OutboxMessage::email(format!("payment:{}:confirmation", event.payment_id), &confirmation)?,
        )
        .await?;

        match &self.client_email {
            Some(admin) => {
                let notice = EmailMessage::new(
                    admin.clone(),
                    "New Order Received",
                    templates::new_order_admin(
                        &customer_name,
                        &bundle.customer.email,
                        &bundle.order.order_number,
                        &bundle.order.product_name,
                        bundle.order.quantity,
                        bundle.order.total_price,
                    ),
                );
                outbox::enqueue(
                    &*self.db,
                    OutboxMessage::email(format!("payment:{}:admin", event.payment_id), &notice)?,
                )
                .await?;
            }
            None => warn!("client email not configured, skipping new order notice"),
        }

        info!(payment_id = event.payment_id, order_number = %bundle.order.order_number, "order emails queued");
        Ok(())
    }
}

#[async_trait]
impl OutboxHandler for NotificationDispatcher {
    async fn handle(&self, event_type: &str, payload: &Value) -> Result<(), ServiceError> {
        match event_type {
            EVENT_EMAIL => self.send_email(payload).await,
            EVENT_PAYMENT_CONFIRMED => self.payment_confirmed(payload).await,
            other => Err(ServiceError::InternalError(format!(
                "Unknown outbox event type {}",
                other
            ))),
        }
    }
}
