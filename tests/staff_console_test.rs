mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{TestApp, ADMIN_EMAIL};

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/auth/login",
            Some(json!({ "email": ADMIN_EMAIL, "password": "not-the-password" })),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "Invalid email or password");
}

#[tokio::test]
async fn staff_routes_require_a_token() {
    let app = TestApp::new().await;

    for uri in ["/api/v1/orders", "/api/v1/kits", "/api/v1/notifications", "/api/v1/labs"] {
        let response = app.request(Method::GET, uri, None, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let forged = app
        .request(Method::GET, "/api/v1/orders", None, Some("not.a.jwt"))
        .await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "up");
    assert_eq!(response.body["database"], "up");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/quantity-discounts", None, None)
        .await;

    assert!(response.body["meta"]["request_id"].as_str().is_some());
}

#[tokio::test]
async fn kit_inventory_crud_and_summary() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let invalid = app
        .request(
            Method::POST,
            "/api/v1/kits",
            Some(json!({ "type": "hair", "supplier_name": "Kit Supplies", "quantity": 10 })),
            Some(&token),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body["message"], "Type must be either 'blood' or 'saliva'");

    let created = app
        .request(
            Method::POST,
            "/api/v1/kits",
            Some(json!({
                "type": "Saliva",
                "supplier_name": "Kit Supplies",
                "supplier_contact_number": "0211234567",
                "supplier_address": "4 Dock Road",
                "quantity": 40
            })),
            Some(&token),
        )
        .await;
    assert_eq!(created.status, StatusCode::OK, "{}", created.body);
    assert_eq!(created.message(), "Kit added successfully");
    let kit_id = created.data()["id"].as_i64().unwrap();

    app.request(
        Method::POST,
        "/api/v1/kits",
        Some(json!({ "type": "blood", "supplier_name": "Blood Works", "quantity": 5 })),
        Some(&token),
    )
    .await;

    let summary = app
        .request(Method::GET, "/api/v1/kits/summary", None, Some(&token))
        .await;
    assert_eq!(summary.data()["saliva_quantity"], 40);
    assert_eq!(summary.data()["blood_quantity"], 5);
    assert_eq!(summary.data()["combined_quantity"], 45);

    let updated = app
        .request(
            Method::PATCH,
            &format!("/api/v1/kits/{}", kit_id),
            Some(json!({ "type": "saliva", "supplier_name": "Kit Supplies", "quantity": 25 })),
            Some(&token),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.body);
    assert_eq!(updated.data()["quantity"], 25);

    let saliva_only = app
        .request(Method::GET, "/api/v1/kits?type=saliva", None, Some(&token))
        .await;
    assert_eq!(saliva_only.data()["total"], 1);

    let deleted = app
        .request(Method::DELETE, &format!("/api/v1/kits/{}", kit_id), None, Some(&token))
        .await;
    assert_eq!(deleted.status, StatusCode::OK);
    assert_eq!(deleted.message(), "Kit deleted successfully");

    let gone = app
        .request(Method::DELETE, &format!("/api/v1/kits/{}", kit_id), None, Some(&token))
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let summary = app
        .request(Method::GET, "/api/v1/kits/summary", None, Some(&token))
        .await;
    assert_eq!(summary.data()["saliva_quantity"], 0);
}

#[tokio::test]
async fn staff_see_and_clear_their_notifications() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    app.request(
        Method::POST,
        "/api/v1/kits",
        Some(json!({ "type": "saliva", "supplier_name": "Kit Supplies", "quantity": 3 })),
        Some(&token),
    )
    .await;

    let listed = app
        .request(Method::GET, "/api/v1/notifications?page=1&per_page=5", None, Some(&token))
        .await;
    assert_eq!(listed.status, StatusCode::OK, "{}", listed.body);
    let total = listed.data()["total"].as_u64().unwrap();
    assert!(total >= 1);
    let first_id = listed.data()["items"][0]["id"].as_i64().unwrap();
    assert_eq!(listed.data()["items"][0]["is_read"], false);

    let marked = app
        .request(
            Method::PATCH,
            &format!("/api/v1/notifications/{}/read", first_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(marked.status, StatusCode::OK);

    let missing = app
        .request(Method::PATCH, "/api/v1/notifications/99999/read", None, Some(&token))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let cleared = app
        .request(Method::PATCH, "/api/v1/notifications/read-all", None, Some(&token))
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.data()["updated"].as_u64().unwrap(), total - 1);
}

#[tokio::test]
async fn sealed_products_round_trip_through_the_api() {
    let app = TestApp::new().await;
    let product = json!({
        "product_name": "DNA Health Kit",
        "product_price": "199.00",
        "product_gst_price": "25.96",
        "product_description": "Saliva based DNA test"
    });

    let sealed = app
        .request(Method::POST, "/api/v1/products/encrypt", Some(product), None)
        .await;
    assert_eq!(sealed.status, StatusCode::OK, "{}", sealed.body);
    let encrypted = sealed.data()["encrypted"].as_str().unwrap().to_string();

    let opened = app
        .request(
            Method::POST,
            "/api/v1/products/verify",
            Some(json!({ "data": encrypted })),
            None,
        )
        .await;
    assert_eq!(opened.status, StatusCode::OK, "{}", opened.body);
    assert_eq!(opened.data()["product_name"], "DNA Health Kit");
    assert_eq!(opened.message(), "Product verified successfully");

    let tampered = app
        .request(
            Method::POST,
            "/api/v1/products/verify",
            Some(json!({ "data": "AAAA" })),
            None,
        )
        .await;
    assert_eq!(tampered.status, StatusCode::BAD_REQUEST);

    let raw = app
        .request(Method::POST, "/api/v1/encrypt", Some(json!({ "data": "hello" })), None)
        .await;
    assert_eq!(raw.status, StatusCode::OK);
    assert_eq!(
        app.cipher.decrypt(raw.data()["encrypted"].as_str().unwrap()).unwrap(),
        "hello"
    );

    let empty = app
        .request(Method::POST, "/api/v1/encrypt", Some(json!({})), None)
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body["message"], "Data is required");
}
