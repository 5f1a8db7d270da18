use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Theranostics API",
        version = "1.0.0",
        description = r#"
# Theranostics DNA Kit API

Backend for ordering DNA testing kits, taking payment, dispatching kits and
tracking each kit from patient registration through lab processing to the
final report.

## Authentication

Staff endpoints require a JWT issued by `/api/v1/auth/login`:

```
Authorization: Bearer <your-jwt-token>
```

Checkout, payment callbacks, kit verification and kit registration are public.

## Error Handling

Errors share one envelope:

```json
{
  "error": "Conflict",
  "message": "Kit registration already exists for this QRCode/Barcode",
  "request_id": "b1f1c4e2-...",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Checkout, order management and barcode assignment"),
        (name = "payments", description = "Payment gateway callbacks"),
        (name = "kits", description = "Kit registration and lab lifecycle"),
        (name = "inventory", description = "Kit stock batches"),
        (name = "products", description = "Sealed product and patient payloads"),
        (name = "notifications", description = "Staff notifications"),
        (name = "auth", description = "Staff sign in"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::auth::login,

        // Orders
        crate::handlers::discounts::list_discounts,
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::order_counts,
        crate::handlers::orders::get_order,
        crate::handlers::orders::assign_barcodes,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::lookup_barcode,

        // Payments
        crate::handlers::payments::payment_callback,

        // Kits
        crate::handlers::kit_registrations::verify_barcode,
        crate::handlers::kit_registrations::register_kit,
        crate::handlers::kit_registrations::list_registrations,
        crate::handlers::kit_registrations::update_kit_status,
        crate::handlers::kit_registrations::upload_report,
        crate::handlers::labs::list_labs,

        // Inventory
        crate::handlers::inventory::create_kit,
        crate::handlers::inventory::list_kits,
        crate::handlers::inventory::kit_summary,
        crate::handlers::inventory::update_kit,
        crate::handlers::inventory::delete_kit,

        // Products
        crate::handlers::products::encrypt_data,
        crate::handlers::products::encrypt_product,
        crate::handlers::products::verify_product,

        // Notifications
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_read,
        crate::handlers::notifications::mark_all_read,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::errors::ErrorResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::kit_registration::KitStatus,
            crate::entities::kit::KitType,
            crate::entities::customer::CustomerType,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_routes_and_bearer_scheme() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Theranostics API"));
        assert!(json.contains("/api/v1/orders"));
        assert!(json.contains("/api/v1/kit-registrations/{id}/report"));
        assert!(json.contains("/api/v1/payments/callback"));
        assert!(json.contains("bearer_auth"));
    }
}
