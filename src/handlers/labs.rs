use axum::{extract::State, response::Json};

use crate::{
    auth::RequireAdmin, handlers::AppState, services::orders::LabSummary, ApiResponse, ApiResult,
};

#[utoipa::path(
    get,
    path = "/api/v1/labs",
    summary = "List labs",
    responses(
        (status = 200, description = "Known labs", body = ApiResponse<Vec<LabSummary>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "kits"
)]
pub async fn list_labs(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> ApiResult<Vec<LabSummary>> {
    let labs = state.services.labs.list().await?;
    Ok(Json(ApiResponse::success(labs)))
}
