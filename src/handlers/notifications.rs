use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::RequireAdmin,
    handlers::{
        common::{paginated, PaginationParams},
        AppState,
    },
    services::notifications::NotificationView,
    ApiResponse, ApiResult, PaginatedResponse,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    summary = "List my notifications",
    params(PaginationParams),
    responses((status = 200, description = "Notifications, newest first", body = ApiResponse<PaginatedResponse<NotificationView>>)),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<NotificationView>> {
    let page = params.normalized();
    let (items, total) = state
        .services
        .notifications
        .list_for_user(user.user_id, page.page, page.per_page)
        .await?;
    Ok(Json(paginated(items, total, page)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/notifications/{id}/read",
    summary = "Mark a notification read",
    params(("id" = i32, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Marked read"),
        (status = 404, description = "Notification not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state
        .services
        .notifications
        .mark_read(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(())))
}

#[utoipa::path(
    patch,
    path = "/api/v1/notifications/read-all",
    summary = "Mark all notifications read",
    responses((status = 200, description = "Number of notifications marked", body = ApiResponse<MarkedRead>)),
    security(("bearer_auth" = [])),
    tag = "notifications"
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
) -> ApiResult<MarkedRead> {
    let updated = state
        .services
        .notifications
        .mark_all_read(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(MarkedRead { updated })))
}
