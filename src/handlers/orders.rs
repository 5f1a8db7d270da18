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
        barcodes::BarcodeLookup,
        messages,
        order_status::{AssignKitOutcome, AssignKitRequest, OrderStatusView, UpdateOrderStatusRequest},
        orders::{CreateOrderRequest, CreateOrderResponse, OrderCounts, OrderDetail, OrderFilter, OrderListItem},
    },
    ApiResponse, ApiResult, PaginatedResponse,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub order_status: Option<String>,
    pub payment_status: Option<String>,
    /// Matches order number, customer name or email, and barcode numbers
    pub search: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Validates the checkout, snapshots pricing and returns the payment approval URL",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created successfully", body = ApiResponse<CreateOrderResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<CreateOrderResponse> {
    let created = state.services.orders.create_order(request).await?;
    Ok(Json(
        ApiResponse::success(created).with_message(messages::ORDER_CREATED),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<PaginatedResponse<OrderListItem>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<OrderListQuery>,
) -> ApiResult<PaginatedResponse<OrderListItem>> {
    let page = PaginationParams::from_query(query.page, query.per_page);
    let filter = OrderFilter {
        order_status: query.order_status,
        payment_status: query.payment_status,
        search: query.search,
    };
    let (items, total) = state
        .services
        .orders
        .list(page.page, page.per_page, filter)
        .await?;
    Ok(Json(paginated(items, total, page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/counts",
    summary = "Order counts by status",
    description = "Counts over paid orders",
    responses(
        (status = 200, description = "Counts", body = ApiResponse<OrderCounts>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn order_counts(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> ApiResult<OrderCounts> {
    let counts = state.services.orders.counts().await?;
    Ok(Json(ApiResponse::success(counts)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Order detail",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with payments, barcodes and registrations", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
) -> ApiResult<OrderDetail> {
    let detail = state.services.orders.detail(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/barcodes",
    summary = "Assign barcodes",
    description = "Assigns kit barcodes to a paid order. Filling the order moves it to Processing.",
    params(("id" = i32, Path, description = "Order id")),
    request_body = AssignKitRequest,
    responses(
        (status = 200, description = "Barcodes assigned", body = ApiResponse<AssignKitOutcome>),
        (status = 400, description = "Invalid barcodes or unpaid order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Barcode already assigned or quantity exceeded", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn assign_barcodes(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<AssignKitRequest>,
) -> ApiResult<AssignKitOutcome> {
    let outcome = state
        .services
        .order_status
        .assign_kit(&user.actor(), id, &request.barcodes)
        .await?;
    let message = messages::barcodes_assigned(outcome.assigned);
    Ok(Json(ApiResponse::success(outcome).with_message(message)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = i32, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated successfully", body = ApiResponse<OrderStatusView>),
        (status = 400, description = "Invalid status or transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Status unchanged", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(user): RequireAdmin,
    Path(id): Path<i32>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderStatusView> {
    let view = state
        .services
        .order_status
        .update_order_status(&user.actor(), id, request)
        .await?;
    Ok(Json(
        ApiResponse::success(view).with_message(messages::ORDER_STATUS_UPDATED),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/barcodes/{barcode_number}",
    summary = "Look up a barcode",
    description = "Everything known about one kit: order, customer, payment, invoices and registration",
    params(("barcode_number" = String, Path, description = "30 character kit barcode")),
    responses(
        (status = 200, description = "Barcode found", body = ApiResponse<BarcodeLookup>),
        (status = 404, description = "No QRCode/Barcode found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn lookup_barcode(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(barcode_number): Path<String>,
) -> ApiResult<BarcodeLookup> {
    let found = state.services.barcodes.lookup(&barcode_number).await?;
    Ok(Json(ApiResponse::success(found)))
}
