use axum::{extract::State, response::Json};

use crate::{
    auth::{LoginRequest, LoginResponse},
    handlers::AppState,
    services::messages,
    ApiResponse, ApiResult,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    summary = "Staff login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let response = state.auth.login(&request).await?;
    Ok(Json(
        ApiResponse::success(response).with_message(messages::LOGIN_SUCCESS),
    ))
}
