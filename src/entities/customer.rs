use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CustomerType {
    #[sea_orm(string_value = "customer")]
    Customer,
    #[sea_orm(string_value = "clinic")]
    Clinic,
}

/// A purchaser, unique by email. A customer created with a `clinic_id` stays
/// bound to that clinic for every later order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub first_name: String,
    pub last_name: Option<String>,
    #[sea_orm(unique)]
    pub email: String,
    pub phone_number: String,
    pub country: String,
    pub street_address: String,
    pub town_city: String,
    pub region: String,
    pub postcode: String,
    pub shipping_country: String,
    pub shipping_address: String,
    pub shipping_town_city: String,
    pub shipping_region: String,
    pub shipping_postcode: String,
    pub customer_type: CustomerType,
    pub clinic_id: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    /// The clinic this customer is bound to, if any.
    pub fn bound_clinic(&self) -> Option<&str> {
        self.clinic_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
    #[sea_orm(has_many = "super::kit_registration::Entity")]
    KitRegistrations,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl Related<super::kit_registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KitRegistrations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
