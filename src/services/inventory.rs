use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::{
        kit::{self, Entity as KitEntity, KitType},
        order::{self, PaymentStatus},
        role,
    },
    errors::{validate_in_order, FieldOrder, ServiceError},
    services::{
        messages,
        notifications::{notify_roles, NotificationDraft, ENTITY_KITS, TYPE_INVENTORY_MANAGEMENT},
        validation::{trim_optional, NAME_RE, PHONE_RE},
        Actor,
    },
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct KitRequest {
    #[serde(rename = "type")]
    pub kit_type: String,
    #[validate(
        length(min = 3, max = 50, message = "Supplier name must be between 3 and 50 characters"),
        regex(path = "NAME_RE", message = "Supplier name must contain only letters and single spaces")
    )]
    pub supplier_name: String,
    #[validate(regex(path = "PHONE_RE", message = "Supplier contact number must be 10 to 15 digits"))]
    pub supplier_contact_number: Option<String>,
    #[validate(length(min = 5, max = 100, message = "Supplier address must be between 5 and 100 characters"))]
    pub supplier_address: Option<String>,
    #[validate(range(min = 0, max = 999999, message = "Quantity must be between 0 and 999999"))]
    pub quantity: i32,
}

impl FieldOrder for KitRequest {
    const FIELD_ORDER: &'static [&'static str] = &[
        "supplier_name",
        "supplier_contact_number",
        "supplier_address",
        "quantity",
    ];
}

impl KitRequest {
    fn checked(self) -> Result<(KitType, Self), ServiceError> {
        let request = Self {
            kit_type: self.kit_type.trim().to_lowercase(),
            supplier_name: self.supplier_name.trim().to_string(),
            supplier_contact_number: trim_optional(self.supplier_contact_number),
            supplier_address: trim_optional(self.supplier_address),
            quantity: self.quantity,
        };
        let kit_type = KitType::from_str(&request.kit_type).map_err(|_| {
            ServiceError::ValidationError("Type must be either 'blood' or 'saliva'".to_string())
        })?;
        validate_in_order(&request)?;
        Ok((kit_type, request))
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KitView {
    pub id: i32,
    #[serde(rename = "type")]
    pub kit_type: KitType,
    pub supplier_name: String,
    pub supplier_contact_number: Option<String>,
    pub supplier_address: Option<String>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<kit::Model> for KitView {
    fn from(k: kit::Model) -> Self {
        Self {
            id: k.id,
            kit_type: k.kit_type,
            supplier_name: k.supplier_name,
            supplier_contact_number: k.supplier_contact_number,
            supplier_address: k.supplier_address,
            quantity: k.quantity,
            created_at: k.created_at,
            updated_at: k.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct KitSummary {
    pub blood_quantity: i64,
    pub saliva_quantity: i64,
    pub combined_quantity: i64,
}

/// Stock of one kit type across non-deleted batches.
pub async fn stock_of<C: ConnectionTrait>(conn: &C, kit_type: KitType) -> Result<i64, ServiceError> {
    let total: Option<Option<i64>> = KitEntity::find()
        .filter(kit::Column::IsDeleted.eq(false))
        .filter(kit::Column::KitType.eq(kit_type))
        .select_only()
        .column_as(kit::Column::Quantity.sum(), "total")
        .into_tuple()
        .one(conn)
        .await?;
    Ok(total.flatten().unwrap_or(0))
}

/// Saliva kits on hand minus kits already sold. Negative when oversold.
pub async fn available_saliva_stock<C: ConnectionTrait>(conn: &C) -> Result<i64, ServiceError> {
    let stock = stock_of(conn, KitType::Saliva).await?;
    let sold: Option<Option<i64>> = order::Entity::find()
        .filter(order::Column::IsDeleted.eq(false))
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::Completed))
        .select_only()
        .column_as(order::Column::Quantity.sum(), "total")
        .into_tuple()
        .one(conn)
        .await?;
    Ok(stock - sold.flatten().unwrap_or(0))
}

fn kit_draft(title: &str, verb: &str, actor: &Actor, kit: &kit::Model) -> NotificationDraft {
    NotificationDraft {
        title: title.to_string(),
        message: format!(
            "{} kit batch from {} ({} units) {} by {}",
            kit.kit_type, kit.supplier_name, kit.quantity, verb, actor.name
        ),
        notification_type: TYPE_INVENTORY_MANAGEMENT.to_string(),
        username: actor.name.clone(),
        entity_type: ENTITY_KITS.to_string(),
        entity_id: kit.id,
        metadata: Some(json!({
            "module": "Inventory",
            "type": kit.kit_type.to_string(),
            "quantity": kit.quantity,
        })),
    }
}

/// Kit stock batches.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(user_id = actor.id))]
    pub async fn create_kit(&self, actor: &Actor, request: KitRequest) -> Result<KitView, ServiceError> {
        let (kit_type, request) = request.checked()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let now = Utc::now();
        let kit = kit::ActiveModel {
            kit_type: Set(kit_type),
            supplier_name: Set(request.supplier_name),
            supplier_contact_number: Set(request.supplier_contact_number),
            supplier_address: Set(request.supplier_address),
            quantity: Set(request.quantity),
            status: Set(true),
            created_by: Set(actor.id),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        notify_roles(&txn, &role::STAFF_ROLES, &kit_draft("Kit Added", "added", actor, &kit)).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit kit: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        info!(kit_id = kit.id, %kit_type, quantity = kit.quantity, "kit batch added");
        Ok(kit.into())
    }

    #[instrument(skip(self, request), fields(kit_id = kit_id, user_id = actor.id))]
    pub async fn update_kit(
        &self,
        actor: &Actor,
        kit_id: i32,
        request: KitRequest,
    ) -> Result<KitView, ServiceError> {
        let (kit_type, request) = request.checked()?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let existing = find_kit(&txn, kit_id).await?;
        let mut active: kit::ActiveModel = existing.into();
        active.kit_type = Set(kit_type);
        active.supplier_name = Set(request.supplier_name);
        active.supplier_contact_number = Set(request.supplier_contact_number);
        active.supplier_address = Set(request.supplier_address);
        active.quantity = Set(request.quantity);
        active.updated_at = Set(Utc::now());
        let kit = active.update(&txn).await?;

        notify_roles(&txn, &role::STAFF_ROLES, &kit_draft("Kit Updated", "updated", actor, &kit))
            .await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit kit {}: {}", kit_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(kit_id, "kit batch updated");
        Ok(kit.into())
    }

    #[instrument(skip(self), fields(kit_id = kit_id, user_id = actor.id))]
    pub async fn delete_kit(&self, actor: &Actor, kit_id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let existing = find_kit(&txn, kit_id).await?;
        let mut active: kit::ActiveModel = existing.into();
        active.is_deleted = Set(true);
        active.updated_at = Set(Utc::now());
        let kit = active.update(&txn).await?;

        notify_roles(&txn, &role::STAFF_ROLES, &kit_draft("Kit Deleted", "deleted", actor, &kit))
            .await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit kit {}: {}", kit_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(kit_id, "kit batch deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_kits(
        &self,
        page: u64,
        per_page: u64,
        kit_type: Option<&str>,
    ) -> Result<(Vec<KitView>, u64), ServiceError> {
        let mut query = KitEntity::find().filter(kit::Column::IsDeleted.eq(false));
        if let Some(kind) = kit_type.map(str::trim).filter(|t| !t.is_empty()) {
            let kind = KitType::from_str(&kind.to_lowercase()).map_err(|_| {
                ServiceError::ValidationError("Type must be either 'blood' or 'saliva'".to_string())
            })?;
            query = query.filter(kit::Column::KitType.eq(kind));
        }

        let paginator = query
            .order_by_desc(kit::Column::CreatedAt)
            .order_by_desc(kit::Column::Id)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let kits = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((kits.into_iter().map(KitView::from).collect(), total))
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<KitSummary, ServiceError> {
        let blood_quantity = stock_of(&*self.db, KitType::Blood).await?;
        let saliva_quantity = stock_of(&*self.db, KitType::Saliva).await?;
        Ok(KitSummary {
            blood_quantity,
            saliva_quantity,
            combined_quantity: blood_quantity + saliva_quantity,
        })
    }
}

async fn find_kit<C: ConnectionTrait>(conn: &C, kit_id: i32) -> Result<kit::Model, ServiceError> {
    KitEntity::find_by_id(kit_id)
        .one(conn)
        .await?
        .filter(|k| !k.is_deleted)
        .ok_or_else(|| ServiceError::NotFound(messages::KIT_NOT_FOUND.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use crate::entities::notification;
    use crate::entities::order::OrderStatus;
    use crate::services::notifications::tests::add_staff;
    use crate::services::test_support::seed_paid_order;

    fn request(kit_type: &str, quantity: i32) -> KitRequest {
        KitRequest {
            kit_type: kit_type.into(),
            supplier_name: "Acme Labs".into(),
            supplier_contact_number: Some(" 0211234567 ".into()),
            supplier_address: None,
            quantity,
        }
    }

    async fn setup() -> (Arc<DatabaseConnection>, InventoryService, Actor) {
        let db = Arc::new(memory_db().await);
        let id = add_staff(&db, "stock@example.com", role::ADMIN).await;
        let actor = Actor {
            id,
            name: "Staff Member".into(),
        };
        (db.clone(), InventoryService::new(db), actor)
    }

    #[tokio::test]
    async fn crud_keeps_summary_and_notifies_staff() {
        let (db, service, actor) = setup().await;

        let saliva = service.create_kit(&actor, request("Saliva", 40)).await.unwrap();
        assert_eq!(saliva.supplier_contact_number.as_deref(), Some("0211234567"));
        let blood = service.create_kit(&actor, request("blood", 10)).await.unwrap();

        service.update_kit(&actor, blood.id, request("blood", 15)).await.unwrap();
        assert_eq!(
            service.summary().await.unwrap(),
            KitSummary {
                blood_quantity: 15,
                saliva_quantity: 40,
                combined_quantity: 55
            }
        );

        service.delete_kit(&actor, blood.id).await.unwrap();
        assert_eq!(service.summary().await.unwrap().blood_quantity, 0);
        assert!(matches!(
            service.delete_kit(&actor, blood.id).await,
            Err(ServiceError::NotFound(_))
        ));

        let (items, total) = service.list_kits(1, 10, Some("SALIVA")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, saliva.id);

        let titles: Vec<String> = notification::Entity::find()
            .order_by_asc(notification::Column::Id)
            .all(&*db)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, ["Kit Added", "Kit Added", "Kit Updated", "Kit Deleted"]);
    }

    #[tokio::test]
    async fn rejects_unknown_type_and_bad_quantity() {
        let (_db, service, actor) = setup().await;
        assert!(matches!(
            service.create_kit(&actor, request("urine", 1)).await,
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_kit(&actor, request("blood", 1_000_000)).await,
            Err(ServiceError::ValidationError(m)) if m == "Quantity must be between 0 and 999999"
        ));
    }

    #[tokio::test]
    async fn available_stock_subtracts_paid_orders() {
        let (db, service, actor) = setup().await;
        service.create_kit(&actor, request("saliva", 30)).await.unwrap();
        service.create_kit(&actor, request("blood", 100)).await.unwrap();
        seed_paid_order(&db, 25, OrderStatus::Pending).await;
        crate::services::test_support::seed_order(&db, 4, None).await;

        assert_eq!(available_saliva_stock(&*db).await.unwrap(), 5);
    }
}
