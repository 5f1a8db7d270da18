use axum::{
    extract::{Multipart, Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::RequireAdmin,
    errors::ServiceError,
    handlers::{
        common::{paginated, PaginationParams},
        AppState,
    },
    services::{
        kit_registrations::{RegistrationFilter, RegistrationListItem, VerifiedBarcode},
        kit_status::{KitStatusChange, KitStatusRequest, ReportUpload},
        messages,
    },
    ApiResponse, ApiResult, PaginatedResponse,
};

const REPORT_FIELD: &str = "file";

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyBarcodeRequest {
    pub barcode_number: String,
}

/// Patient details sealed with the double cipher by the registration form.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterKitRequest {
    pub patient_data: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredKit {
    pub id: i32,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RegistrationListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Kit status name, e.g. `Received`
    pub status: Option<String>,
    pub search: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/kit-registrations/verify",
    summary = "Verify a kit barcode",
    description = "Checks that a barcode belongs to a dispatched order and has not been registered yet",
    request_body = VerifyBarcodeRequest,
    responses(
        (status = 200, description = "Barcode can be registered", body = ApiResponse<VerifiedBarcode>),
        (status = 400, description = "Malformed barcode", body = crate::errors::ErrorResponse),
        (status = 404, description = "Barcode not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Kit already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "kits"
)]
pub async fn verify_barcode(
    State(state): State<AppState>,
    Json(request): Json<VerifyBarcodeRequest>,
) -> ApiResult<VerifiedBarcode> {
    let verified = state
        .services
        .kit_registrations
        .verify(&request.barcode_number)
        .await?;
    Ok(Json(
        ApiResponse::success(verified).with_message(messages::BARCODE_VERIFIED),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/kit-registrations",
    summary = "Register a kit",
    description = "Stores the patient's details against a dispatched barcode. Patient fields are kept encrypted.",
    request_body = RegisterKitRequest,
    responses(
        (status = 200, description = "Kit registered", body = ApiResponse<RegisteredKit>),
        (status = 400, description = "Invalid patient data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Barcode not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Kit already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "kits"
)]
pub async fn register_kit(
    State(state): State<AppState>,
    Json(request): Json<RegisterKitRequest>,
) -> ApiResult<RegisteredKit> {
    let id = state
        .services
        .kit_registrations
        .register(&request.patient_data)
        .await?;
    Ok(Json(
        ApiResponse::success(RegisteredKit { id }).with_message(messages::KIT_REGISTERED),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/kit-registrations",
    summary = "List kit registrations",
    params(RegistrationListQuery),
    responses(
        (status = 200, description = "Registrations, newest first", body = ApiResponse<PaginatedResponse<RegistrationListItem>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "kits"
)]
pub async fn list_registrations(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<RegistrationListQuery>,
) -> ApiResult<PaginatedResponse<RegistrationListItem>> {
    let page = PaginationParams::from_query(query.page, query.per_page);
    let filter = RegistrationFilter {
        status: query.status,
        search: query.search,
    };
    let (items, total) = state
        .services
        .kit_registrations
        .list(page.page, page.per_page, filter)
        .await?;
    Ok(Json(paginated(items, total, page)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/kit-registrations/{id}/status",
    summary = "Update kit status",
    description = "Moves a kit through Received, Send, Ready and Reject. Sending requires a lab.",
    params(("id" = i32, Path, description = "Kit registration id")),
    request_body = KitStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<KitStatusChange>),
        (status = 400, description = "Invalid status, transition or lab details", body = crate::errors::ErrorResponse),
        (status = 404, description = "Registration or lab not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Status unchanged", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "kits"
)]
pub async fn update_kit_status(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<KitStatusRequest>,
) -> ApiResult<KitStatusChange> {
    let change = state
        .services
        .kit_status
        .update_status(id, &request)
        .await?;
    Ok(Json(
        ApiResponse::success(change).with_message(messages::PATIENT_STATUS_UPDATED),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/kit-registrations/{id}/report",
    summary = "Upload a lab report",
    description = "Multipart upload with a single `file` field. PDF or XML, at most 10 MB.",
    params(("id" = i32, Path, description = "Kit registration id")),
    responses(
        (status = 200, description = "Report stored", body = ApiResponse<ReportUpload>),
        (status = 400, description = "Missing, oversized or unsupported file", body = crate::errors::ErrorResponse),
        (status = 404, description = "Registration not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "kits"
)]
pub async fn upload_report(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> ApiResult<ReportUpload> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(registration_id = id, "unreadable multipart body: {}", e);
        ServiceError::BadRequest(e.body_text())
    })? {
        if field.name() != Some(REPORT_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = upload
        .filter(|(name, bytes)| !name.is_empty() && !bytes.is_empty())
        .ok_or_else(|| ServiceError::ValidationError(messages::REPORT_MISSING.to_string()))?;

    let stored = state
        .services
        .kit_status
        .upload_report(id, &file_name, &bytes)
        .await?;
    Ok(Json(
        ApiResponse::success(stored).with_message(messages::REPORT_UPLOADED),
    ))
}
