use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use tracing::{error, info, instrument};

use crate::{
    entities::{customer, invoice, order, payment},
    errors::ServiceError,
    notifications::templates::{self, InvoiceDocument},
    services::{
        messages,
        pricing::{breakdown, Breakdown},
    },
};

/// A rendered invoice and the records it was built from.
#[derive(Debug, Clone)]
pub struct InvoiceBundle {
    pub invoice: invoice::Model,
    pub order: order::Model,
    pub customer: customer::Model,
    pub breakdown: Breakdown,
    pub invoice_link: String,
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
    files_dir: PathBuf,
    api_url: String,
}

impl InvoiceService {
    pub fn new(db: Arc<DatabaseConnection>, files_dir: PathBuf, api_url: String) -> Self {
        Self {
            db,
            files_dir,
            api_url,
        }
    }

    /// Renders the invoice document for a completed payment and records its
    /// public link. Rendering again overwrites the same file.
    #[instrument(skip(self))]
    pub async fn render_for_payment(&self, payment_id: i32) -> Result<InvoiceBundle, ServiceError> {
        let db = &*self.db;
        let payment = payment::Entity::find_by_id(payment_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::PAYMENT_NOT_FOUND.to_string()))?;
        let invoice = invoice::Entity::find()
            .filter(invoice::Column::PaymentId.eq(payment_id))
            .filter(invoice::Column::IsDeleted.eq(false))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No invoice for payment {}", payment_id)))?;
        let order = order::Entity::find_by_id(payment.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::ORDER_NOT_FOUND.to_string()))?;
        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))?;

        // Snapshot fields on the invoice, never the current catalog.
        let breakdown = breakdown(
            invoice.price,
            invoice.product_gst_price,
            invoice.product_discount,
            order.quantity,
        );
        let billing_address = format!(
            "{}, {}, {} {}, {}",
            customer.street_address, customer.town_city, customer.region, customer.postcode, customer.country
        );
        let customer_name = customer.full_name();
        let html = templates::invoice_document(&InvoiceDocument {
            invoice_id: &invoice.invoice_id,
            issued_at: invoice.created_at,
            order_number: &order.order_number,
            customer_name: &customer_name,
            customer_email: &customer.email,
            billing_address,
            product_name: &order.product_name,
            breakdown: &breakdown,
        });

        tokio::fs::create_dir_all(&self.files_dir).await.map_err(|e| {
            error!("Failed to create files dir {}: {}", self.files_dir.display(), e);
            ServiceError::InternalError("Failed to store invoice".to_string())
        })?;
        let file_name = format!("invoice_{}.html", invoice.invoice_id);
        let path = self.files_dir.join(&file_name);
        tokio::fs::write(&path, html).await.map_err(|e| {
            error!("Failed to write invoice {}: {}", path.display(), e);
            ServiceError::InternalError("Failed to store invoice".to_string())
        })?;

        let invoice_link = format!("{}/files/{}", self.api_url.trim_end_matches('/'), file_name);
        let invoice = if invoice.invoice_link.as_deref() == Some(invoice_link.as_str()) {
            invoice
        } else {
            let mut active: invoice::ActiveModel = invoice.into();
            active.invoice_link = Set(Some(invoice_link.clone()));
            active.updated_at = Set(Utc::now());
            active.update(db).await?
        };

        info!(payment_id, invoice_id = %invoice.invoice_id, "invoice rendered");
        Ok(InvoiceBundle {
            invoice,
            order,
            customer,
            breakdown,
            invoice_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use crate::entities::order::OrderStatus;
    use crate::services::test_support::seed_paid_order;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn renders_document_from_snapshot() {
        let db = Arc::new(memory_db().await);
        let order = seed_paid_order(&db, 2, OrderStatus::Pending).await;
        let payment = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        invoice::ActiveModel {
            payment_id: Set(payment.id),
            invoice_id: Set("SL-20250102-0042".into()),
            invoice_link: Set(None),
            price: Set(order.product_price),
            product_gst_price: Set(order.product_gst_price),
            product_discount: Set(order.product_discount),
            is_deleted: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let service = InvoiceService::new(db.clone(), dir.path().to_path_buf(), "https://api.example.com/".into());
        let bundle = service.render_for_payment(payment.id).await.unwrap();

        assert_eq!(
            bundle.invoice_link,
            "https://api.example.com/files/invoice_SL-20250102-0042.html"
        );
        assert_eq!(bundle.invoice.invoice_link.as_deref(), Some(bundle.invoice_link.as_str()));
        assert_eq!(bundle.breakdown.total, dec!(100.00));
        let html = std::fs::read_to_string(dir.path().join("invoice_SL-20250102-0042.html")).unwrap();
        assert!(html.contains(&order.order_number));

        // idempotent
        service.render_for_payment(payment.id).await.unwrap();
    }

    #[tokio::test]
    async fn missing_invoice_is_not_found() {
        let db = Arc::new(memory_db().await);
        let order = seed_paid_order(&db, 1, OrderStatus::Pending).await;
        let dir = tempfile::tempdir().unwrap();
        let service = InvoiceService::new(db.clone(), dir.path().to_path_buf(), "https://api.example.com".into());
        let payment = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            service.render_for_payment(payment.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
