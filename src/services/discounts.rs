use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use tracing::{error, instrument};
use utoipa::ToSchema;

use crate::{
    entities::quantity_discount::{self, Entity as QuantityDiscountEntity},
    errors::ServiceError,
};

/// Discount percentage for `quantity`: the tier with the highest threshold
/// not above it, or zero when no tier applies.
pub async fn resolve<C: ConnectionTrait>(conn: &C, quantity: i32) -> Result<Decimal, ServiceError> {
    let tier = QuantityDiscountEntity::find()
        .filter(quantity_discount::Column::IsDeleted.eq(false))
        .filter(quantity_discount::Column::Quantity.lte(quantity))
        .order_by_desc(quantity_discount::Column::Quantity)
        .one(conn)
        .await
        .map_err(|e| {
            error!("Failed to resolve discount for quantity {}: {}", quantity, e);
            ServiceError::DatabaseError(e)
        })?;

    Ok(tier.map(|t| t.discount).unwrap_or(Decimal::ZERO))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscountTier {
    pub id: i32,
    pub quantity: i32,
    pub discount: Decimal,
}

impl From<quantity_discount::Model> for DiscountTier {
    fn from(model: quantity_discount::Model) -> Self {
        Self {
            id: model.id,
            quantity: model.quantity,
            discount: model.discount,
        }
    }
}

#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DatabaseConnection>,
}

impl DiscountService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Active tiers, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<DiscountTier>, ServiceError> {
        let tiers = QuantityDiscountEntity::find()
            .filter(quantity_discount::Column::IsDeleted.eq(false))
            .order_by_desc(quantity_discount::Column::CreatedAt)
            .order_by_desc(quantity_discount::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(tiers.into_iter().map(DiscountTier::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, quantity: i32) -> Result<Decimal, ServiceError> {
        resolve(&*self.db, quantity).await
    }
}
