use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::{
    entities::{
        notification::{self, Entity as NotificationEntity},
        role::{self, Entity as RoleEntity},
        user::{self, Entity as UserEntity},
    },
    errors::ServiceError,
    services::messages,
};

pub const TYPE_ORDER_PURCHASE: &str = "Order Purchase";
pub const TYPE_ORDER_MANAGEMENT: &str = "Order Management";
pub const TYPE_INVENTORY_MANAGEMENT: &str = "Inventory Management";
pub const ENTITY_ORDERS: &str = "orders";
pub const ENTITY_KITS: &str = "kits";

/// Content of an in-app notification before it is fanned out to users.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub username: String,
    pub entity_type: String,
    pub entity_id: i32,
    pub metadata: Option<Value>,
}

impl NotificationDraft {
    pub fn for_order(
        title: &str,
        message: String,
        notification_type: &str,
        username: String,
        order_id: i32,
        status: &str,
        order_number: &str,
    ) -> Self {
        Self {
            title: title.to_string(),
            message,
            notification_type: notification_type.to_string(),
            username,
            entity_type: ENTITY_ORDERS.to_string(),
            entity_id: order_id,
            metadata: Some(json!({
                "status": status,
                "module": "Manage Orders",
                "order_number": order_number,
            })),
        }
    }
}

/// Writes one notification per active user holding any of `roles`, inside
/// the caller's transaction. Returns the number of rows written.
pub async fn notify_roles<C: ConnectionTrait>(
    conn: &C,
    roles: &[&str],
    draft: &NotificationDraft,
) -> Result<usize, ServiceError> {
    let role_ids: Vec<i32> = RoleEntity::find()
        .filter(role::Column::Name.is_in(roles.iter().copied()))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();
    if role_ids.is_empty() {
        error!("No roles found for {:?}", roles);
        return Err(ServiceError::InternalError(messages::NO_ROLES_FOUND.to_string()));
    }

    let recipients = UserEntity::find()
        .filter(user::Column::RoleId.is_in(role_ids))
        .filter(user::Column::Status.eq(true))
        .filter(user::Column::IsDeleted.eq(false))
        .all(conn)
        .await?;
    if recipients.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let rows = recipients.iter().map(|u| notification::ActiveModel {
        user_id: Set(u.id),
        title: Set(draft.title.clone()),
        message: Set(draft.message.clone()),
        notification_type: Set(draft.notification_type.clone()),
        username: Set(draft.username.clone()),
        entity_type: Set(draft.entity_type.clone()),
        entity_id: Set(draft.entity_id),
        metadata: Set(draft.metadata.clone()),
        is_read: Set(false),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    });
    NotificationEntity::insert_many(rows)
        .exec_without_returning(conn)
        .await?;

    info!(
        title = %draft.title,
        recipients = recipients.len(),
        "notified staff"
    );
    Ok(recipients.len())
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationView {
    pub id: i32,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub username: String,
    pub entity_type: String,
    pub entity_id: i32,
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
    pub is_read: bool,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<notification::Model> for NotificationView {
    fn from(n: notification::Model) -> Self {
        Self {
            id: n.id,
            title: n.title,
            message: n.message,
            notification_type: n.notification_type,
            username: n.username,
            entity_type: n.entity_type,
            entity_id: n.entity_id,
            metadata: n.metadata,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The user's notifications, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: i32,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<NotificationView>, u64), ServiceError> {
        let paginator = NotificationEntity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsDeleted.eq(false))
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items.into_iter().map(NotificationView::from).collect(), total))
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, user_id: i32, id: i32) -> Result<(), ServiceError> {
        let result = NotificationEntity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .col_expr(notification::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(notification::Column::Id.eq(id))
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsDeleted.eq(false))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(
                messages::NOTIFICATION_NOT_FOUND.to_string(),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: i32) -> Result<u64, ServiceError> {
        let result = NotificationEntity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .col_expr(notification::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .filter(notification::Column::IsDeleted.eq(false))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
