//! Human-readable identifiers of the form `PREFIX-YYYYMMDD-NNNN`.

use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::path::Path;
use tracing::warn;

use crate::{
    entities::{invoice, order},
    errors::ServiceError,
    services::messages,
};

pub const MAX_ATTEMPTS: usize = 100;
pub const INVOICE_PREFIX: &str = "SL";

pub fn candidate(prefix: &str, now: DateTime<Utc>, rng: &mut impl Rng) -> String {
    format!(
        "{}-{}-{:04}",
        prefix,
        now.format("%Y%m%d"),
        rng.gen_range(0..10_000)
    )
}

/// Picks an order number not yet used by any order. The unique index on
/// `orders.order_number` still guards concurrent allocations.
pub async fn allocate_order_number<C: ConnectionTrait>(
    conn: &C,
    prefix: &str,
) -> Result<String, ServiceError> {
    let mut rng = StdRng::from_entropy();
    allocate_order_number_with(conn, prefix, Utc::now(), &mut rng).await
}

/// Draws candidates from `rng` until one is free, giving up after
/// `MAX_ATTEMPTS` collisions.
pub async fn allocate_order_number_with<C, R>(
    conn: &C,
    prefix: &str,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<String, ServiceError>
where
    C: ConnectionTrait,
    R: Rng + Send,
{
    for _ in 0..MAX_ATTEMPTS {
        let number = candidate(prefix, now, rng);
        let taken = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(number.as_str()))
            .count(conn)
            .await?;
        if taken == 0 {
            return Ok(number);
        }
    }
    warn!("exhausted {} order number attempts", MAX_ATTEMPTS);
    Err(ServiceError::InternalError(
        messages::ORDER_NUMBER_EXHAUSTED.to_string(),
    ))
}

pub async fn allocate_invoice_id<C: ConnectionTrait>(conn: &C) -> Result<String, ServiceError> {
    for _ in 0..MAX_ATTEMPTS {
        let id = candidate(INVOICE_PREFIX, Utc::now(), &mut rand::thread_rng());
        let taken = invoice::Entity::find()
            .filter(invoice::Column::InvoiceId.eq(id.as_str()))
            .count(conn)
            .await?;
        if taken == 0 {
            return Ok(id);
        }
    }
    warn!("exhausted {} invoice id attempts", MAX_ATTEMPTS);
    Err(ServiceError::InternalError(
        messages::INVOICE_ID_EXHAUSTED.to_string(),
    ))
}

/// A file name `YYYYMMDD_NNNN{ext}` not present in `dir`.
pub async fn allocate_file_name(dir: &Path, extension: &str) -> Result<String, ServiceError> {
    for _ in 0..MAX_ATTEMPTS {
        let name = {
            let mut rng = rand::thread_rng();
            format!(
                "{}_{:04}{}",
                Utc::now().format("%Y%m%d"),
                rng.gen_range(0..10_000),
                extension
            )
        };
        let exists = tokio::fs::try_exists(dir.join(&name))
            .await
            .map_err(|e| ServiceError::InternalError(format!("Failed to inspect upload dir: {}", e)))?;
        if !exists {
            return Ok(name);
        }
    }
    Err(ServiceError::InternalError(
        "Failed to generate a unique file name".to_string(),
    ))
}
