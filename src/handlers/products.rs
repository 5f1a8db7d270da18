use axum::{extract::State, response::Json};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    handlers::AppState,
    services::{
        messages,
        products::{ProductDetails, Sealed},
    },
    ApiResponse, ApiResult,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct EncryptRequest {
    /// A string is sealed verbatim; any other JSON value as its serialized text.
    #[schema(value_type = Object)]
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyProductRequest {
    pub data: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/encrypt",
    summary = "Seal arbitrary data",
    request_body = EncryptRequest,
    responses(
        (status = 200, description = "Sealed payload", body = ApiResponse<Sealed>),
        (status = 400, description = "No data", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn encrypt_data(
    State(state): State<AppState>,
    Json(request): Json<EncryptRequest>,
) -> ApiResult<Sealed> {
    let sealed = state.services.products.encrypt_value(&request.data)?;
    Ok(Json(ApiResponse::success(sealed).with_message(messages::ENCRYPTED)))
}

#[utoipa::path(
    post,
    path = "/api/v1/products/encrypt",
    summary = "Seal product details",
    request_body = ProductDetails,
    responses(
        (status = 200, description = "Sealed product", body = ApiResponse<Sealed>),
        (status = 400, description = "Invalid product", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn encrypt_product(
    State(state): State<AppState>,
    Json(product): Json<ProductDetails>,
) -> ApiResult<Sealed> {
    let sealed = state.services.products.encrypt_product(product)?;
    Ok(Json(ApiResponse::success(sealed).with_message(messages::ENCRYPTED)))
}

#[utoipa::path(
    post,
    path = "/api/v1/products/verify",
    summary = "Open and validate sealed product details",
    request_body = VerifyProductRequest,
    responses(
        (status = 200, description = "Product details", body = ApiResponse<ProductDetails>),
        (status = 400, description = "Tampered or invalid product", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn verify_product(
    State(state): State<AppState>,
    Json(request): Json<VerifyProductRequest>,
) -> ApiResult<ProductDetails> {
    let product = state.services.products.verify_product(&request.data)?;
    Ok(Json(
        ApiResponse::success(product).with_message(messages::PRODUCT_VERIFIED),
    ))
}
