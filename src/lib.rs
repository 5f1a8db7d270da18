//! Theranostics API Library
//!
//! Order, payment and kit registration backend for the DNA testing kit
//! storefront and staff console.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderValue,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use utoipa::ToSchema;

use crate::handlers::AppServices;

/// Uploads are capped at 10 MB by the report rules; the extra room covers
/// multipart framing so oversized files get the domain message, not a 413.
const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub auth: Arc<auth::AuthService>,
    pub services: AppServices,
}

impl FromRef<AppState> for Arc<auth::AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(per_page),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes nested under `/api/v1`. Staff routes are guarded by the
/// `RequireAdmin` extractor in each handler.
pub fn api_v1_routes() -> Router<AppState> {
    use handlers::*;

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .route("/quantity-discounts", get(discounts::list_discounts))
        .route("/payments/callback", get(payments::payment_callback))
        .route("/kit-registrations/verify", post(kit_registrations::verify_barcode))
        .route("/encrypt", post(products::encrypt_data))
        .route("/products/encrypt", post(products::encrypt_product))
        .route("/products/verify", post(products::verify_product));

    let orders = Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/counts", get(orders::order_counts))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/barcodes", post(orders::assign_barcodes))
        .route("/orders/:id/status", patch(orders::update_order_status))
        .route("/barcodes/:barcode_number", get(orders::lookup_barcode));

    let kits = Router::new()
        .route(
            "/kit-registrations",
            post(kit_registrations::register_kit).get(kit_registrations::list_registrations),
        )
        .route(
            "/kit-registrations/:id/status",
            patch(kit_registrations::update_kit_status),
        )
        .route(
            "/kit-registrations/:id/report",
            patch(kit_registrations::upload_report),
        )
        .route("/kits", post(inventory::create_kit).get(inventory::list_kits))
        .route("/kits/summary", get(inventory::kit_summary))
        .route(
            "/kits/:id",
            patch(inventory::update_kit).delete(inventory::delete_kit),
        )
        .route("/labs", get(labs::list_labs));

    let staff = Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/notifications/:id/read", patch(notifications::mark_read));

    public.merge(orders).merge(kits).merge(staff)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    if origins.is_empty() {
        // Config validation requires origins outside development.
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// The complete application: API, docs, static files and middleware.
pub fn build_router(state: AppState) -> Router {
    let files = ServeDir::new(&state.config.files_dir);
    let cors = cors_layer(&state.config);
    let db = state.db.clone();

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .nest_service("/files", files)
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            db,
            middleware_helpers::error_log_middleware,
        ))
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
