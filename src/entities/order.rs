use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fulfillment status of an order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[strum(ascii_case_insensitive)]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Dispatched")]
    Dispatched,
    #[sea_orm(string_value = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
    /// Only produced by a failed or abandoned payment.
    #[sea_orm(string_value = "Failed")]
    Failed,
}

/// Payment status mirrored on the order and its payment rows.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Failed")]
    Failed,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl PaymentStatus {
    /// A payment that has left `Pending` never changes again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of order status changes, stored as a JSON array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema)]
pub struct StatusHistory(pub Vec<StatusEntry>);

impl StatusHistory {
    pub fn starting_at(status: OrderStatus, timestamp: DateTime<Utc>) -> Self {
        Self(vec![StatusEntry { status, timestamp }])
    }

    /// Returns a new history with `status` appended. Timestamps never go
    /// backwards even if the wall clock does.
    pub fn appended(&self, status: OrderStatus, now: DateTime<Utc>) -> Self {
        let timestamp = match self.0.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let mut entries = self.0.clone();
        entries.push(StatusEntry { status, timestamp });
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.0
    }
}

/// The `orders` table. Prices are a snapshot taken at checkout: `product_price`
/// is the GST-exclusive unit price and `product_discount` the tier percentage.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub customer_id: i32,
    pub product_name: String,
    pub product_description: Option<String>,
    pub product_image: Option<String>,
    pub product_price: Decimal,
    pub product_gst_price: Decimal,
    pub product_discount: Decimal,
    pub quantity: i32,
    #[sea_orm(unique)]
    pub order_number: String,
    pub total_price: Decimal,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    #[sea_orm(column_type = "Json")]
    pub order_status_history: StatusHistory,
    pub tracking_id: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    #[sea_orm(has_many = "super::barcode::Entity")]
    Barcodes,
    #[sea_orm(has_many = "super::kit_registration::Entity")]
    KitRegistrations,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::barcode::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Barcodes.def()
    }
}

impl Related<super::kit_registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KitRegistrations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn order_status_parses_case_insensitively() {
        assert_eq!(OrderStatus::from_str("dispatched").ok(), Some(OrderStatus::Dispatched));
        assert_eq!(OrderStatus::from_str("SHIPPED").ok(), Some(OrderStatus::Shipped));
        assert!(OrderStatus::from_str("lost").is_err());
        assert_eq!(OrderStatus::Processing.to_string(), "Processing");
    }

    #[test]
    fn history_append_never_goes_backwards() {
        let start = Utc::now();
        let history = StatusHistory::starting_at(OrderStatus::Pending, start);
        let skewed = history.appended(OrderStatus::Processing, start - Duration::seconds(30));

        assert_eq!(skewed.len(), 2);
        assert_eq!(history.len(), 1);
        assert!(skewed.entries()[1].timestamp >= skewed.entries()[0].timestamp);
        assert_eq!(skewed.entries()[1].status, OrderStatus::Processing);
    }

    #[test]
    fn history_serializes_as_plain_array() {
        let ts = DateTime::parse_from_rfc3339("2025-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let history = StatusHistory::starting_at(OrderStatus::Pending, ts);
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "status": "Pending", "timestamp": "2025-01-02T03:04:05Z" }])
        );
    }
}
