use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{info, instrument};

use crate::{
    entities::lab::{self, Entity as LabEntity},
    errors::ServiceError,
    services::{messages, orders::LabSummary, validation::NHI_RE},
};

/// Lab details supplied when a kit is sent to a lab that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLab {
    pub lab_name: String,
    pub lab_address: String,
    pub nhi_number: String,
}

impl NewLab {
    /// Trims and checks the fields, reporting the first failure.
    pub fn parse(
        lab_name: Option<&str>,
        lab_address: Option<&str>,
        nhi_number: Option<&str>,
    ) -> Result<Self, ServiceError> {
        let invalid = |m: &str| ServiceError::ValidationError(m.to_string());

        let lab_name = lab_name.unwrap_or_default().trim().to_string();
        match lab_name.chars().count() {
            n if n < 5 => return Err(invalid(messages::LAB_NAME_TOO_SHORT)),
            n if n > 255 => return Err(invalid(messages::LAB_NAME_TOO_LONG)),
            _ => {}
        }

        let lab_address = lab_address.unwrap_or_default().trim().to_string();
        match lab_address.chars().count() {
            n if n < 5 => return Err(invalid(messages::LAB_ADDRESS_TOO_SHORT)),
            n if n > 255 => return Err(invalid(messages::LAB_ADDRESS_TOO_LONG)),
            _ => {}
        }

        let nhi_number = nhi_number.unwrap_or_default().trim().to_string();
        if nhi_number.is_empty() {
            return Err(invalid(messages::NHI_REQUIRED));
        }
        if nhi_number.chars().count() > 10 {
            return Err(invalid(messages::NHI_TOO_LONG));
        }
        if !NHI_RE.is_match(&nhi_number) {
            return Err(invalid(messages::NHI_INVALID));
        }

        Ok(Self {
            lab_name,
            lab_address,
            nhi_number,
        })
    }
}

/// An existing, non-deleted lab.
pub async fn find_lab<C: ConnectionTrait>(conn: &C, lab_id: i32) -> Result<lab::Model, ServiceError> {
    LabEntity::find_by_id(lab_id)
        .one(conn)
        .await?
        .filter(|l| !l.is_deleted)
        .ok_or_else(|| ServiceError::NotFound(messages::LAB_NOT_FOUND.to_string()))
}

/// Reuses a lab with exactly the same name, address and NHI number, or
/// creates one.
pub async fn find_or_create<C: ConnectionTrait>(conn: &C, new_lab: &NewLab) -> Result<lab::Model, ServiceError> {
    let existing = LabEntity::find()
        .filter(lab::Column::LabName.eq(new_lab.lab_name.as_str()))
        .filter(lab::Column::LabAddress.eq(new_lab.lab_address.as_str()))
        .filter(lab::Column::NhiNumber.eq(new_lab.nhi_number.as_str()))
        .filter(lab::Column::IsDeleted.eq(false))
        .one(conn)
        .await?;
    if let Some(lab) = existing {
        return Ok(lab);
    }

    let now = Utc::now();
    let lab = lab::ActiveModel {
        lab_name: Set(new_lab.lab_name.clone()),
        lab_address: Set(new_lab.lab_address.clone()),
        nhi_number: Set(new_lab.nhi_number.clone()),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;
    info!(lab_id = lab.id, "lab created");
    Ok(lab)
}

#[derive(Clone)]
pub struct LabService {
    db: Arc<DatabaseConnection>,
}

impl LabService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<LabSummary>, ServiceError> {
        let labs = LabEntity::find()
            .filter(lab::Column::IsDeleted.eq(false))
            .order_by_asc(lab::Column::LabName)
            .all(&*self.db)
            .await?;
        Ok(labs.into_iter().map(LabSummary::from).collect())
    }
}
