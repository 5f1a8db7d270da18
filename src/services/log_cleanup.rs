use chrono::{Months, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::entities::error_log;
use crate::errors::ServiceError;

pub const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// Deletes error log rows older than one month. Returns the number removed.
pub async fn prune_error_logs(db: &DatabaseConnection) -> Result<u64, ServiceError> {
    let now = Utc::now();
    let cutoff = now.checked_sub_months(Months::new(1)).unwrap_or(now);
    let result = error_log::Entity::delete_many()
        .filter(error_log::Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Runs [`prune_error_logs`] on `every`. The first run happens right away.
pub fn start(db: Arc<DatabaseConnection>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match prune_error_logs(&db).await {
                Ok(removed) => info!(removed, "error log cleanup finished"),
                Err(e) => error!("error log cleanup failed: {}", e),
            }
        }
    })
}
