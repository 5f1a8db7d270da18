use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::{
    db::conflict_on_unique,
    entities::{
        barcode::{self, Entity as BarcodeEntity},
        customer,
        order::{self, OrderStatus, PaymentStatus},
        role,
    },
    errors::ServiceError,
    events::{
        outbox::{self, OutboxMessage},
        Event, EventSender,
    },
    notifications::{templates, EmailMessage},
    services::{
        barcodes::{parse_batch, BarcodeInput},
        messages,
        notifications::{notify_roles, NotificationDraft, TYPE_ORDER_MANAGEMENT},
        payments::{apply_order_status, lock_order},
        validation::trim_optional,
        Actor,
    },
};

const TRACKING_ID_MAX_LEN: usize = 50;

/// Statuses staff may move an order to from `from`. `Failed` only comes
/// from the payment flow.
pub fn allowed_next(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Processing, Cancelled],
        Processing => &[Dispatched, Cancelled],
        Dispatched => &[Shipped, Delivered, Cancelled],
        Shipped => &[Delivered],
        Delivered | Cancelled | Failed => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_next(from).contains(&to)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignKitRequest {
    #[schema(value_type = Object)]
    pub barcodes: BarcodeInput,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssignKitOutcome {
    pub order_id: i32,
    pub assigned: usize,
    pub barcode_count: u64,
    pub order_status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub order_status: String,
    pub tracking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderStatusView {
    pub order_id: i32,
    pub order_status: OrderStatus,
    pub tracking_id: Option<String>,
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Assigns physical kits to a paid order. The batch is all or nothing,
    /// and filling the order moves it to `Processing`.
    #[instrument(skip(self, input), fields(order_id = order_id, user_id = actor.id))]
    pub async fn assign_kit(
        &self,
        actor: &Actor,
        order_id: i32,
        input: &BarcodeInput,
    ) -> Result<AssignKitOutcome, ServiceError> {
        let barcodes = parse_batch(input)?;

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let order = lock_order(&txn, order_id).await?;
        if order.payment_status != PaymentStatus::Completed {
            return Err(ServiceError::BadRequest(
                messages::PAYMENT_NOT_COMPLETED.to_string(),
            ));
        }

        let existing = assigned_count(&txn, order.id).await?;
        if existing + barcodes.len() as u64 > order.quantity as u64 {
            return Err(ServiceError::Conflict(
                messages::BARCODES_EXCEED_QUANTITY.to_string(),
            ));
        }

        let taken: HashSet<String> = BarcodeEntity::find()
            .filter(barcode::Column::BarcodeNumber.is_in(barcodes.iter().cloned()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|b| b.barcode_number)
            .collect();
        if let Some(dup) = barcodes.iter().find(|b| taken.contains(*b)) {
            return Err(ServiceError::Conflict(messages::barcode_already_assigned(dup)));
        }

        let now = Utc::now();
        let rows = barcodes.iter().map(|number| barcode::ActiveModel {
            order_id: Set(order.id),
            barcode_number: Set(number.clone()),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        });
        BarcodeEntity::insert_many(rows)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| conflict_on_unique(e, messages::DUPLICATE_BARCODE_IN_REQUEST))?;

        let barcode_count = existing + barcodes.len() as u64;
        let filled = barcode_count == order.quantity as u64
            && can_transition(order.order_status, OrderStatus::Processing);

        let order = if filled {
            let updated =
                apply_order_status(&txn, order, None, OrderStatus::Processing, None).await?;
            self.enqueue_status_email(&txn, &updated).await?;
            updated
        } else {
            order
        };

        let draft = NotificationDraft::for_order(
            "Kits Assigned",
            format!(
                "{} kits assigned by {}. Order ID: {}, {} of {} assigned",
                barcodes.len(),
                actor.name,
                order.order_number,
                barcode_count,
                order.quantity
            ),
            TYPE_ORDER_MANAGEMENT,
            actor.name.clone(),
            order.id,
            &order.order_status.to_string(),
            &order.order_number,
        );
        notify_roles(&txn, &role::STAFF_ROLES, &draft).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit barcodes for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id,
            assigned = barcodes.len(),
            barcode_count,
            processing = filled,
            "barcodes assigned"
        );
        if let Some(sender) = &self.event_sender {
            sender
                .publish(Event::BarcodesAssigned {
                    order_id,
                    count: barcodes.len(),
                    order_processing: filled,
                })
                .await;
        }

        Ok(AssignKitOutcome {
            order_id,
            assigned: barcodes.len(),
            barcode_count,
            order_status: order.order_status,
        })
    }

    /// Staff status change along the order transition table.
    #[instrument(skip(self, request), fields(order_id = order_id, user_id = actor.id))]
    pub async fn update_order_status(
        &self,
        actor: &Actor,
        order_id: i32,
        request: UpdateOrderStatusRequest,
    ) -> Result<OrderStatusView, ServiceError> {
        let new_status = OrderStatus::from_str(request.order_status.trim())
            .ok()
            .filter(|s| *s != OrderStatus::Failed)
            .ok_or_else(|| {
                ServiceError::ValidationError(messages::INVALID_ORDER_STATUS.to_string())
            })?;
        let tracking_id = trim_optional(request.tracking_id);
        if tracking_id
            .as_deref()
            .is_some_and(|t| t.chars().count() > TRACKING_ID_MAX_LEN)
        {
            return Err(ServiceError::ValidationError(
                messages::TRACKING_ID_TOO_LONG.to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        let order = lock_order(&txn, order_id).await?;
        let old_status = order.order_status;
        if old_status == new_status {
            return Err(ServiceError::Conflict(
                messages::ORDER_STATUS_UNCHANGED.to_string(),
            ));
        }
        if order.payment_status != PaymentStatus::Completed {
            return Err(ServiceError::BadRequest(
                messages::PAYMENT_NOT_COMPLETED.to_string(),
            ));
        }
        if assigned_count(&txn, order.id).await? == 0 {
            return Err(ServiceError::BadRequest(
                messages::NO_BARCODES_ASSIGNED.to_string(),
            ));
        }
        if !can_transition(old_status, new_status) {
            return Err(ServiceError::BadRequest(messages::transition_not_allowed(
                &old_status.to_string(),
                &new_status.to_string(),
            )));
        }

        let order = apply_order_status(&txn, order, None, new_status, tracking_id).await?;
        self.enqueue_status_email(&txn, &order).await?;

        let draft = NotificationDraft::for_order(
            "Order Status Updated",
            format!(
                "Order status updated by {}. Order ID: {}, New Status: {}",
                actor.name, order.order_number, new_status
            ),
            TYPE_ORDER_MANAGEMENT,
            actor.name.clone(),
            order.id,
            &new_status.to_string(),
            &order.order_number,
        );
        notify_roles(&txn, &role::STAFF_ROLES, &draft).await?;

        txn.commit().await.map_err(|e| {
            error!("Failed to commit status for order {}: {}", order_id, e);
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id, from = %old_status, to = %new_status, "order status updated");
        if let Some(sender) = &self.event_sender {
            sender
                .publish(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                })
                .await;
        }

        Ok(OrderStatusView {
            order_id,
            order_status: order.order_status,
            tracking_id: order.tracking_id,
        })
    }

    /// Queues the customer's status email. The history length makes the
    /// dedupe key unique per change.
    async fn enqueue_status_email(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
    ) -> Result<(), ServiceError> {
        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))?;
        let html = templates::order_status_update(
            &customer.full_name(),
            &order.order_number,
            &order.order_status.to_string(),
            order.tracking_id.as_deref(),
        );
        let key = format!("order:{}:status:{}", order.id, order.order_status_history.len());
        outbox::enqueue(
            txn,
            OutboxMessage::email(key, &EmailMessage::new(customer.email, "Order Status Update", html))?,
        )
        .await?;
        Ok(())
    }
}

async fn assigned_count(txn: &DatabaseTransaction, order_id: i32) -> Result<u64, ServiceError> {
    Ok(BarcodeEntity::find()
        .filter(barcode::Column::OrderId.eq(order_id))
        .filter(barcode::Column::IsDeleted.eq(false))
        .count(txn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use crate::entities::{notification, outbox_event};
    use crate::services::notifications::tests::add_staff;
    use crate::services::test_support::{add_barcodes, barcode_number, seed_order, seed_paid_order};
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Processing, true)]
    #[case(OrderStatus::Pending, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Pending, OrderStatus::Shipped, false)]
    #[case(OrderStatus::Processing, OrderStatus::Dispatched, true)]
    #[case(OrderStatus::Processing, OrderStatus::Pending, false)]
    #[case(OrderStatus::Dispatched, OrderStatus::Shipped, true)]
    #[case(OrderStatus::Dispatched, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Shipped, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Delivered, OrderStatus::Processing, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Pending, false)]
    #[case(OrderStatus::Failed, OrderStatus::Processing, false)]
    fn order_transition_table(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(can_transition(from, to), allowed);
    }

    #[test]
    fn nothing_moves_into_failed() {
        use sea_orm::Iterable;
        for from in OrderStatus::iter() {
            assert!(!can_transition(from, OrderStatus::Failed));
        }
    }

    fn barcodes(range: std::ops::Range<usize>) -> BarcodeInput {
        BarcodeInput::List(range.map(barcode_number).collect())
    }

    async fn setup() -> (Arc<DatabaseConnection>, OrderStatusService, Actor) {
        let db = Arc::new(memory_db().await);
        let id = add_staff(&db, "ops@example.com", role::ADMIN).await;
        let actor = Actor {
            id,
            name: "Staff Member".into(),
        };
        (db.clone(), OrderStatusService::new(db, None), actor)
    }

    async fn barcode_total(db: &DatabaseConnection, order_id: i32) -> u64 {
        BarcodeEntity::find()
            .filter(barcode::Column::OrderId.eq(order_id))
            .count(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn filling_the_order_moves_it_to_processing() {
        let (db, service, actor) = setup().await;
        let order = seed_paid_order(&db, 10, OrderStatus::Pending).await;
        add_barcodes(&db, order.id, &(0..9).map(barcode_number).collect::<Vec<_>>()).await;

        let over = service.assign_kit(&actor, order.id, &barcodes(100..102)).await;
        assert!(matches!(over, Err(ServiceError::Conflict(m)) if m == messages::BARCODES_EXCEED_QUANTITY));
        assert_eq!(barcode_total(&db, order.id).await, 9);

        let outcome = service.assign_kit(&actor, order.id, &barcodes(100..101)).await.unwrap();
        assert_eq!(outcome.barcode_count, 10);
        assert_eq!(outcome.order_status, OrderStatus::Processing);

        let stored = order::Entity::find_by_id(order.id).one(&*db).await.unwrap().unwrap();
        let history = stored.order_status_history.entries();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, OrderStatus::Processing);
        assert!(history[1].timestamp >= history[0].timestamp);

        let emails = outbox_event::Entity::find().count(&*db).await.unwrap();
        assert_eq!(emails, 1);
        let titles: Vec<String> = notification::Entity::find()
            .all(&*db)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, ["Kits Assigned"]);
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let (db, service, actor) = setup().await;
        let first = seed_paid_order(&db, 5, OrderStatus::Pending).await;
        let second = seed_paid_order(&db, 5, OrderStatus::Pending).await;
        add_barcodes(&db, first.id, &[barcode_number(7)]).await;

        let clash = BarcodeInput::List(vec![barcode_number(8), barcode_number(7)]);
        let result = service.assign_kit(&actor, second.id, &clash).await;
        assert!(matches!(
            result,
            Err(ServiceError::Conflict(m)) if m == messages::barcode_already_assigned(&barcode_number(7))
        ));
        assert_eq!(barcode_total(&db, second.id).await, 0);

        let invalid = BarcodeInput::Csv(format!("{},bad", barcode_number(9)));
        assert!(matches!(
            service.assign_kit(&actor, second.id, &invalid).await,
            Err(ServiceError::ValidationError(_))
        ));
        assert_eq!(barcode_total(&db, second.id).await, 0);
    }

    #[tokio::test]
    async fn unpaid_orders_cannot_take_kits() {
        let (db, service, actor) = setup().await;
        let (order, _) = seed_order(&db, 1, None).await;
        assert!(matches!(
            service.assign_kit(&actor, order.id, &barcodes(1..2)).await,
            Err(ServiceError::BadRequest(m)) if m == messages::PAYMENT_NOT_COMPLETED
        ));
        assert!(matches!(
            service.assign_kit(&actor, 9999, &barcodes(1..2)).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    fn status(s: &str, tracking: Option<&str>) -> UpdateOrderStatusRequest {
        UpdateOrderStatusRequest {
            order_status: s.into(),
            tracking_id: tracking.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn status_updates_follow_the_table() {
        let (db, service, actor) = setup().await;
        let order = seed_paid_order(&db, 1, OrderStatus::Pending).await;

        assert!(matches!(
            service.update_order_status(&actor, order.id, status("processing", None)).await,
            Err(ServiceError::BadRequest(m)) if m == messages::NO_BARCODES_ASSIGNED
        ));
        service.assign_kit(&actor, order.id, &barcodes(1..2)).await.unwrap();

        assert!(matches!(
            service.update_order_status(&actor, order.id, status("PROCESSING", None)).await,
            Err(ServiceError::Conflict(m)) if m == messages::ORDER_STATUS_UNCHANGED
        ));
        assert!(matches!(
            service.update_order_status(&actor, order.id, status("failed", None)).await,
            Err(ServiceError::ValidationError(m)) if m == messages::INVALID_ORDER_STATUS
        ));
        assert!(matches!(
            service.update_order_status(&actor, order.id, status("delivered", None)).await,
            Err(ServiceError::BadRequest(m)) if m == "Transition from Processing to Delivered is not allowed"
        ));
        assert!(matches!(
            service
                .update_order_status(&actor, order.id, status("dispatched", Some(&"x".repeat(51))))
                .await,
            Err(ServiceError::ValidationError(m)) if m == messages::TRACKING_ID_TOO_LONG
        ));

        let view = service
            .update_order_status(&actor, order.id, status("dispatched", Some(" NZ123 ")))
            .await
            .unwrap();
        assert_eq!(view.order_status, OrderStatus::Dispatched);
        assert_eq!(view.tracking_id.as_deref(), Some("NZ123"));

        let stored = order::Entity::find_by_id(order.id).one(&*db).await.unwrap().unwrap();
        assert_eq!(stored.order_status_history.len(), 3);
        // Processing and Dispatched emails
        assert_eq!(outbox_event::Entity::find().count(&*db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unpaid_order_status_is_rejected() {
        let (db, service, actor) = setup().await;
        let (order, _) = seed_order(&db, 1, None).await;
        assert!(matches!(
            service.update_order_status(&actor, order.id, status("processing", None)).await,
            Err(ServiceError::BadRequest(m)) if m == messages::PAYMENT_NOT_COMPLETED
        ));
    }
}
