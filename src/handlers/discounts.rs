use axum::{extract::State, response::Json};

use crate::{handlers::AppState, services::discounts::DiscountTier, ApiResponse, ApiResult};

#[utoipa::path(
    get,
    path = "/api/v1/quantity-discounts",
    summary = "List quantity discount tiers",
    responses((status = 200, description = "Active tiers, newest first", body = ApiResponse<Vec<DiscountTier>>)),
    tag = "orders"
)]
pub async fn list_discounts(State(state): State<AppState>) -> ApiResult<Vec<DiscountTier>> {
    let tiers = state.services.discounts.list().await?;
    Ok(Json(ApiResponse::success(tiers)))
}
