//! Persists failed requests to `error_logs` for later inspection.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tracing::warn;

use crate::entities::error_log;
use crate::tracing::RequestId;

/// Records every 4xx/5xx response. The insert runs on a detached task so a
/// slow or failing store never delays the response.
pub async fn error_log_middleware(
    State(db): State<Arc<DatabaseConnection>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|rid| rid.as_str().to_string());

    let response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let entry = error_log::ActiveModel {
            method: Set(method),
            path: Set(path),
            status_code: Set(i32::from(status.as_u16())),
            message: Set(status.canonical_reason().unwrap_or("Error").to_string()),
            request_id: Set(request_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        tokio::spawn(async move {
            if let Err(e) = entry.insert(db.as_ref()).await {
                warn!(error = %e, "failed to record error log");
            }
        });
    }

    response
}
