use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::RequireAdmin,
    handlers::{
        common::{paginated, PaginationParams},
        AppState,
    },
    services::{
        inventory::{KitRequest, KitSummary, KitView},
        messages,
    },
    ApiResponse, ApiResult, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct KitListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// `blood` or `saliva`
    #[serde(rename = "type")]
    pub kit_type: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/kits",
    summary = "Add a kit batch",
    request_body = KitRequest,
    responses(
        (status = 200, description = "Kit batch added", body = ApiResponse<KitView>),
        (status = 400, description = "Invalid kit data", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn create_kit(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Json(request): Json<KitRequest>,
) -> ApiResult<KitView> {
    let kit = state
        .services
        .inventory
        .create_kit(&user.actor(), request)
        .await?;
    Ok(Json(ApiResponse::success(kit).with_message(messages::KIT_CREATED)))
}

#[utoipa::path(
    get,
    path = "/api/v1/kits",
    summary = "List kit batches",
    params(KitListQuery),
    responses(
        (status = 200, description = "Kit batches, newest first", body = ApiResponse<PaginatedResponse<KitView>>),
        (status = 400, description = "Unknown kit type", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn list_kits(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<KitListQuery>,
) -> ApiResult<PaginatedResponse<KitView>> {
    let page = PaginationParams::from_query(query.page, query.per_page);
    let (items, total) = state
        .services
        .inventory
        .list_kits(page.page, page.per_page, query.kit_type.as_deref())
        .await?;
    Ok(Json(paginated(items, total, page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/kits/summary",
    summary = "Stock by kit type",
    responses((status = 200, description = "Stock totals", body = ApiResponse<KitSummary>)),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn kit_summary(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> ApiResult<KitSummary> {
    let summary = state.services.inventory.summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/kits/{id}",
    summary = "Update a kit batch",
    params(("id" = i32, Path, description = "Kit batch id")),
    request_body = KitRequest,
    responses(
        (status = 200, description = "Kit batch updated", body = ApiResponse<KitView>),
        (status = 400, description = "Invalid kit data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Kit not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn update_kit(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<KitRequest>,
) -> ApiResult<KitView> {
    let kit = state
        .services
        .inventory
        .update_kit(&user.actor(), id, request)
        .await?;
    Ok(Json(ApiResponse::success(kit).with_message(messages::KIT_UPDATED)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/kits/{id}",
    summary = "Delete a kit batch",
    params(("id" = i32, Path, description = "Kit batch id")),
    responses(
        (status = 200, description = "Kit batch deleted"),
        (status = 404, description = "Kit not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "inventory"
)]
pub async fn delete_kit(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state
        .services
        .inventory
        .delete_kit(&user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::success(()).with_message(messages::KIT_DELETED)))
}
