use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "labs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub lab_name: String,
    pub lab_address: String,
    pub nhi_number: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::kit_registration::Entity")]
    KitRegistrations,
}

impl Related<super::kit_registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KitRegistrations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
