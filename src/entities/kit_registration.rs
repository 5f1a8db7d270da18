use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lab processing status of a registered kit.
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
pub enum KitStatus {
    #[sea_orm(string_value = "Not-Received")]
    #[serde(rename = "Not-Received")]
    #[strum(serialize = "Not-Received")]
    NotReceived,
    #[sea_orm(string_value = "Received")]
    Received,
    #[sea_orm(string_value = "Reject")]
    Reject,
    #[sea_orm(string_value = "Send")]
    Send,
}

/// Binds one barcode of a paid order to a patient. Patient fields are stored
/// encrypted; see [`crate::crypto::DoubleCipher`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "kit_registrations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub barcode_id: i32,
    pub order_id: i32,
    pub customer_id: i32,
    pub lab_id: Option<i32>,
    #[serde(skip_serializing)]
    pub first_name: String,
    #[serde(skip_serializing)]
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub email: String,
    #[serde(skip_serializing)]
    pub gender: String,
    #[serde(skip_serializing)]
    pub age: String,
    pub is_clinic_inform: bool,
    pub kit_status: KitStatus,
    pub reason: Option<String>,
    pub file_path: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::barcode::Entity",
        from = "Column::BarcodeId",
        to = "super::barcode::Column::Id"
    )]
    Barcode,
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::lab::Entity",
        from = "Column::LabId",
        to = "super::lab::Column::Id"
    )]
    Lab,
}

impl Related<super::barcode::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Barcode.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::lab::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lab.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
