use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::{messages, payments::CallbackStatus},
    ApiResponse, ApiResult,
};

/// Query string the gateway return URLs carry back to the storefront.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackQuery {
    pub payment_id: Option<i32>,
    /// Gateway order token
    pub token: Option<String>,
    /// `success`, `cancel`, or anything else for a failure
    pub action: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CallbackResponse {
    pub action: String,
    pub status: CallbackStatus,
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/callback",
    summary = "Payment gateway callback",
    description = "Settles a payment after the customer returns from the gateway. Each payment settles once.",
    params(CallbackQuery),
    responses(
        (status = 200, description = "Payment settled", body = ApiResponse<CallbackResponse>),
        (status = 400, description = "Missing parameters", body = crate::errors::ErrorResponse),
        (status = 402, description = "Capture failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment already processed", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<CallbackResponse> {
    let missing = || ServiceError::BadRequest(messages::PAYMENT_CALLBACK_PARAMS.to_string());
    let payment_id = query.payment_id.ok_or_else(missing)?;
    let token = query.token.filter(|t| !t.trim().is_empty()).ok_or_else(missing)?;
    let action = query.action.filter(|a| !a.trim().is_empty()).ok_or_else(missing)?;

    let outcome = state
        .services
        .payments
        .handle_callback(payment_id, &token, &action)
        .await?;

    if let Some(gateway_error) = outcome.gateway_error {
        warn!(payment_id, "capture failed: {}", gateway_error);
        return Err(ServiceError::PaymentFailed(format!(
            "{}: {}",
            messages::PAYMENT_FAILED,
            gateway_error
        )));
    }

    Ok(Json(
        ApiResponse::success(CallbackResponse {
            action: outcome.action,
            status: outcome.status,
        })
        .with_message(outcome.message),
    ))
}
