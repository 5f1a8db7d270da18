use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    crypto::DoubleCipher,
    entities::{
        barcode, customer, invoice, kit_registration, lab,
        order::{self, OrderStatus, PaymentStatus},
        payment,
    },
    errors::ServiceError,
    services::{
        kit_registrations::RegistrationDetails,
        messages,
        orders::{CustomerSummary, InvoiceSummary, LabSummary, PaymentSummary},
        validation::ALPHANUMERIC_RE,
    },
};

pub const BARCODE_LENGTH: usize = 30;

/// Barcodes as sent by the admin UI: either one comma separated string or a
/// JSON array.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum BarcodeInput {
    List(Vec<String>),
    Csv(String),
}

impl BarcodeInput {
    /// Trimmed, non-empty entries in input order.
    pub fn entries(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            BarcodeInput::List(items) => items.iter().map(String::as_str).collect(),
            BarcodeInput::Csv(text) => text.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Length is checked before format so the message names the first problem.
pub fn validate_barcode(barcode: &str) -> Result<(), ServiceError> {
    if barcode.chars().count() != BARCODE_LENGTH {
        return Err(ServiceError::ValidationError(messages::invalid_barcode_length(
            barcode,
        )));
    }
    if !ALPHANUMERIC_RE.is_match(barcode) {
        return Err(ServiceError::ValidationError(messages::invalid_barcode_format(
            barcode,
        )));
    }
    Ok(())
}

/// Validates a whole batch. Any bad entry rejects the batch.
pub fn parse_batch(input: &BarcodeInput) -> Result<Vec<String>, ServiceError> {
    let barcodes = input.entries();
    if barcodes.is_empty() {
        return Err(ServiceError::ValidationError(
            messages::NO_VALID_BARCODES.to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(barcodes.len());
    for barcode in &barcodes {
        validate_barcode(barcode)?;
        if !seen.insert(barcode.as_str()) {
            return Err(ServiceError::ValidationError(
                messages::DUPLICATE_BARCODE_IN_REQUEST.to_string(),
            ));
        }
    }
    Ok(barcodes)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LookupOrder {
    pub id: i32,
    pub order_number: String,
    pub product_name: String,
    pub quantity: i32,
    pub total_price: Decimal,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything known about one physical kit.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BarcodeLookup {
    pub id: i32,
    pub barcode_number: String,
    pub order: LookupOrder,
    pub customer: Option<CustomerSummary>,
    pub payment: Option<PaymentSummary>,
    pub registration: Option<RegistrationDetails>,
    pub barcode_count: u64,
    pub quantity_matches: bool,
}

#[derive(Clone)]
pub struct BarcodeService {
    db: Arc<DatabaseConnection>,
    cipher: DoubleCipher,
}

impl BarcodeService {
    pub fn new(db: Arc<DatabaseConnection>, cipher: DoubleCipher) -> Self {
        Self { db, cipher }
    }

    #[instrument(skip(self))]
    pub async fn lookup(&self, barcode_number: &str) -> Result<BarcodeLookup, ServiceError> {
        let db = &*self.db;
        let barcode_number = barcode_number.trim();
        let not_found = || ServiceError::NotFound(messages::BARCODE_NOT_FOUND.to_string());

        let barcode = barcode::Entity::find()
            .filter(barcode::Column::BarcodeNumber.eq(barcode_number))
            .filter(barcode::Column::IsDeleted.eq(false))
            .one(db)
            .await?
            .ok_or_else(not_found)?;
        let order = order::Entity::find_by_id(barcode.order_id)
            .one(db)
            .await?
            .filter(|o| !o.is_deleted)
            .ok_or_else(not_found)?;
        let customer = customer::Entity::find_by_id(order.customer_id).one(db).await?;

        let payment = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::IsDeleted.eq(false))
            .order_by_desc(payment::Column::Id)
            .one(db)
            .await?;
        let payment = match payment {
            Some(p) => {
                let invoices = invoice::Entity::find()
                    .filter(invoice::Column::PaymentId.eq(p.id))
                    .filter(invoice::Column::IsDeleted.eq(false))
                    .all(db)
                    .await?
                    .into_iter()
                    .map(|inv| InvoiceSummary {
                        invoice_id: inv.invoice_id,
                        invoice_link: inv.invoice_link,
                        created_at: inv.created_at,
                    })
                    .collect();
                Some(PaymentSummary {
                    id: p.id,
                    payment_status: p.payment_status,
                    transaction_id: p.transaction_id,
                    amount: p.amount,
                    created_at: p.created_at,
                    invoices,
                })
            }
            None => None,
        };

        let registration = kit_registration::Entity::find()
            .filter(kit_registration::Column::BarcodeId.eq(barcode.id))
            .filter(kit_registration::Column::IsDeleted.eq(false))
            .one(db)
            .await?;
        let registration = match registration {
            Some(r) => {
                let lab = match r.lab_id {
                    Some(id) => lab::Entity::find_by_id(id).one(db).await?.map(LabSummary::from),
                    None => None,
                };
                Some(RegistrationDetails::decrypt(&self.cipher, r, lab)?)
            }
            None => None,
        };

        let barcode_count = barcode::Entity::find()
            .filter(barcode::Column::OrderId.eq(order.id))
            .filter(barcode::Column::IsDeleted.eq(false))
            .count(db)
            .await?;

        Ok(BarcodeLookup {
            id: barcode.id,
            barcode_number: barcode.barcode_number,
            quantity_matches: barcode_count == order.quantity as u64,
            barcode_count,
            customer: customer.as_ref().map(CustomerSummary::from),
            payment,
            registration,
            order: LookupOrder {
                id: order.id,
                order_number: order.order_number,
                product_name: order.product_name,
                quantity: order.quantity,
                total_price: order.total_price,
                order_status: order.order_status,
                payment_status: order.payment_status,
                tracking_id: order.tracking_id,
                created_at: order.created_at,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::tests::cipher;
    use crate::db::tests::memory_db;
    use crate::services::test_support::{add_barcodes, barcode_number, seed_paid_order};
    use rstest::rstest;

    #[test]
    fn csv_and_list_inputs_are_trimmed() {
        let csv: BarcodeInput = serde_json::from_str(r#"" a , ,b,""#).unwrap();
        assert_eq!(csv.entries(), ["a", "b"]);
        let list: BarcodeInput = serde_json::from_str(r#"[" a ", "", "b"]"#).unwrap();
        assert_eq!(list.entries(), ["a", "b"]);
    }

    #[rstest]
    #[case("ABC123", "length")]
    #[case("ABCDEFGHIJKLMNOPQRSTUVWXYZ12-4", "format")]
    #[case("ABCDEFGHIJKLMNOPQRSTUVWXYZ12 4", "format")]
    fn invalid_barcodes_name_the_problem(#[case] barcode: &str, #[case] kind: &str) {
        match validate_barcode(barcode) {
            Err(ServiceError::ValidationError(m)) => assert!(m.contains(kind), "{}", m),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn batch_rejects_empty_and_duplicates() {
        assert!(matches!(
            parse_batch(&BarcodeInput::Csv(" , ".into())),
            Err(ServiceError::ValidationError(m)) if m == messages::NO_VALID_BARCODES
        ));
        let dup = BarcodeInput::List(vec![barcode_number(1), barcode_number(1)]);
        assert!(matches!(
            parse_batch(&dup),
            Err(ServiceError::ValidationError(m)) if m == messages::DUPLICATE_BARCODE_IN_REQUEST
        ));
        let ok = BarcodeInput::Csv(format!("{},{}", barcode_number(1), barcode_number(2)));
        assert_eq!(parse_batch(&ok).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn lookup_reports_quantity_match() {
        let db = Arc::new(memory_db().await);
        let order = seed_paid_order(&db, 2, OrderStatus::Pending).await;
        add_barcodes(&db, order.id, &[barcode_number(501)]).await;
        let service = BarcodeService::new(db.clone(), cipher());

        let found = service.lookup(&barcode_number(501)).await.unwrap();
        assert_eq!(found.order.id, order.id);
        assert_eq!(found.barcode_count, 1);
        assert!(!found.quantity_matches);
        assert!(found.registration.is_none());
        assert_eq!(found.payment.unwrap().payment_status, PaymentStatus::Completed);

        assert!(matches!(
            service.lookup(&barcode_number(502)).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
