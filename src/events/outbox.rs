use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::entities::outbox_event::{
    self, ActiveModel as OutboxActiveModel, Column, Entity as OutboxEntity, STATUS_DELIVERED,
    STATUS_FAILED, STATUS_PENDING, STATUS_PROCESSING,
};
use crate::errors::ServiceError;
use crate::notifications::EmailMessage;

pub const EVENT_EMAIL: &str = "email";
pub const EVENT_PAYMENT_CONFIRMED: &str = "payment_confirmed";

const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2;
const MAX_BACKOFF_SECS: i64 = 3600;
const BATCH_SIZE: u64 = 20;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Rows stuck in `processing` longer than this were claimed by a worker
/// that died and are handed out again.
const STALE_CLAIM_SECS: i64 = 300;

/// A unit of deferred work written in the same transaction as the change
/// that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub event_type: String,
    pub payload: Value,
    pub dedupe_key: String,
}

impl OutboxMessage {
    pub fn email(dedupe_key: impl Into<String>, message: &EmailMessage) -> Result<Self, ServiceError> {
        let payload = serde_json::to_value(message)
            .map_err(|e| ServiceError::InternalError(format!("Failed to encode email: {}", e)))?;
        Ok(Self {
            event_type: EVENT_EMAIL.to_string(),
            payload,
            dedupe_key: dedupe_key.into(),
        })
    }

    pub fn payment_confirmed(payment_id: i32) -> Self {
        Self {
            event_type: EVENT_PAYMENT_CONFIRMED.to_string(),
            payload: serde_json::json!({ "payment_id": payment_id }),
            dedupe_key: format!("payment_confirmed:{}", payment_id),
        }
    }
}

/// Inserts `message` into the outbox. Returns false when a row with the same
/// dedupe key already exists, in which case nothing is written.
pub async fn enqueue<C: ConnectionTrait>(
    conn: &C,
    message: OutboxMessage,
) -> Result<bool, ServiceError> {
    let now = Utc::now();
    let row = OutboxActiveModel {
        event_type: Set(message.event_type.clone()),
        payload: Set(message.payload),
        status: Set(STATUS_PENDING.to_string()),
        attempts: Set(0),
        available_at: Set(now),
        dedupe_key: Set(message.dedupe_key.clone()),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(None),
        ..Default::default()
    };

    let inserted = OutboxEntity::insert(row)
        .on_conflict(
            OnConflict::column(Column::DedupeKey)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    if inserted == 0 {
        debug!(dedupe_key = %message.dedupe_key, "outbox event already queued");
        return Ok(false);
    }
    info!(
        event_type = %message.event_type,
        dedupe_key = %message.dedupe_key,
        "enqueued outbox event"
    );
    Ok(true)
}

/// Performs the side effect behind one outbox row. Errors schedule a retry.
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    async fn handle(&self, event_type: &str, payload: &Value) -> Result<(), ServiceError>;
}

/// Background worker polling the outbox. `wake` lets publishers skip the
/// poll interval after a commit.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    handler: Arc<dyn OutboxHandler>,
    wake: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Outbox worker started");
        loop {
            if let Err(e) = drain_once(&db, handler.as_ref(), BATCH_SIZE).await {
                error!("outbox worker error: {}", e);
            }
            tokio::select! {
                _ = sleep(POLL_INTERVAL) => {}
                _ = wake.notified() => {}
            }
        }
    })
}

/// Claims and dispatches up to `batch_size` due rows. Returns how many were
/// delivered.
pub async fn drain_once(
    db: &DatabaseConnection,
    handler: &dyn OutboxHandler,
    batch_size: u64,
) -> Result<usize, ServiceError> {
    release_stale_claims(db).await?;

    let now = Utc::now();
    let due = OutboxEntity::find()
        .filter(Column::Status.eq(STATUS_PENDING))
        .filter(Column::AvailableAt.lte(now))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Id)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut delivered = 0;
    for row in due {
        // The status guard makes the claim exclusive between workers.
        let claim = OutboxEntity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_PROCESSING))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(Column::Id.eq(row.id))
            .filter(Column::Status.eq(STATUS_PENDING))
            .exec(db)
            .await?;
        if claim.rows_affected == 0 {
            continue;
        }

        let attempts = row.attempts + 1;
        match handler.handle(&row.event_type, &row.payload).await {
            Ok(()) => {
                finish(db, &row, STATUS_DELIVERED, None, None).await?;
                delivered += 1;
            }
            Err(e) if attempts < MAX_ATTEMPTS => {
                let retry_at = Utc::now() + backoff(attempts);
                warn!(
                    id = row.id,
                    event_type = %row.event_type,
                    attempts,
                    "outbox delivery failed, retrying at {}: {}",
                    retry_at,
                    e
                );
                finish(db, &row, STATUS_PENDING, Some(retry_at), Some(e.to_string())).await?;
            }
            Err(e) => {
                error!(
                    id = row.id,
                    event_type = %row.event_type,
                    "outbox delivery failed permanently: {}",
                    e
                );
                finish(db, &row, STATUS_FAILED, None, Some(e.to_string())).await?;
            }
        }
    }
    Ok(delivered)
}

async fn finish(
    db: &DatabaseConnection,
    row: &outbox_event::Model,
    status: &str,
    retry_at: Option<chrono::DateTime<Utc>>,
    last_error: Option<String>,
) -> Result<(), ServiceError> {
    let mut update = OutboxEntity::update_many()
        .col_expr(Column::Status, Expr::value(status))
        .col_expr(Column::LastError, Expr::value(last_error))
        .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())));
    if let Some(at) = retry_at {
        update = update.col_expr(Column::AvailableAt, Expr::value(at));
    }
    update.filter(Column::Id.eq(row.id)).exec(db).await?;
    Ok(())
}

async fn release_stale_claims(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let cutoff = Utc::now() - ChronoDuration::seconds(STALE_CLAIM_SECS);
    let released = OutboxEntity::update_many()
        .col_expr(Column::Status, Expr::value(STATUS_PENDING))
        .filter(Column::Status.eq(STATUS_PROCESSING))
        .filter(Column::UpdatedAt.lt(cutoff))
        .exec(db)
        .await?;
    if released.rows_affected > 0 {
        warn!("released {} stale outbox claims", released.rows_affected);
    }
    Ok(())
}

/// Exponential backoff with up to one second of jitter.
fn backoff(attempts: i32) -> ChronoDuration {
    let exp = u32::try_from(attempts).unwrap_or(0).min(20);
    let secs = BASE_BACKOFF_SECS.saturating_pow(exp).min(MAX_BACKOFF_SECS);
    let jitter_ms = rand::thread_rng().gen_range(0..1000);
    ChronoDuration::seconds(secs) + ChronoDuration::milliseconds(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl OutboxHandler for CountingHandler {
        async fn handle(&self, _event_type: &str, _payload: &Value) -> Result<(), ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ServiceError::ExternalServiceError("relay down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert!(backoff(1) >= ChronoDuration::seconds(2));
        assert!(backoff(1) < ChronoDuration::seconds(3));
        assert!(backoff(3) >= ChronoDuration::seconds(8));
        assert!(backoff(30) < ChronoDuration::seconds(MAX_BACKOFF_SECS + 1));
    }

    #[tokio::test]
    async fn duplicate_dedupe_keys_are_ignored() {
        let db = memory_db().await;
        assert!(enqueue(&db, OutboxMessage::payment_confirmed(7)).await.unwrap());
        assert!(!enqueue(&db, OutboxMessage::payment_confirmed(7)).await.unwrap());

        let rows = OutboxEntity::find().all(&db).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn delivered_rows_are_not_dispatched_again() {
        let db = memory_db().await;
        let message = EmailMessage::new("jane@example.com", "Kit Status Update", "<p>x</p>");
        enqueue(&db, OutboxMessage::email("kit:1:status", &message).unwrap())
            .await
            .unwrap();

        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        assert_eq!(drain_once(&db, &handler, 20).await.unwrap(), 1);
        assert_eq!(drain_once(&db, &handler, 20).await.unwrap(), 0);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let row = OutboxEntity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(row.status, STATUS_DELIVERED);
        assert_eq!(row.attempts, 1);
    }

    #[tokio::test]
    async fn failed_delivery_is_rescheduled() {
        let db = memory_db().await;
        enqueue(&db, OutboxMessage::payment_confirmed(1)).await.unwrap();

        let handler = CountingHandler {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        assert_eq!(drain_once(&db, &handler, 20).await.unwrap(), 0);

        let row = OutboxEntity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(row.status, STATUS_PENDING);
        assert_eq!(row.attempts, 1);
        assert!(row.available_at > Utc::now());
        assert_eq!(row.last_error.as_deref(), Some("External service error: relay down"));

        // Not due yet, so a second pass leaves it alone.
        drain_once(&db, &handler, 20).await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
