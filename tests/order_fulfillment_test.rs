mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

use common::{barcode, TestApp, CLIENT_EMAIL};

fn decimal(value: &serde_json::Value) -> Decimal {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn checkout_returns_gateway_approval_url() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(TestApp::checkout("aroha@example.com")),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.message(), "Order created successfully");
    let url = response.data()["payment_url"].as_str().unwrap();
    assert!(url.starts_with("https://gateway.test/approve/"));

    let created = app.gateway.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert!(created[0].return_url.starts_with("http://shop.test"));
}

#[tokio::test]
async fn checkout_rejects_invalid_quantity_for_customers() {
    let app = TestApp::new().await;
    let mut body = TestApp::checkout("aroha@example.com");
    body["quantity"] = json!(3);

    let response = app.request(Method::POST, "/api/v1/orders", Some(body), None).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["message"],
        "Quantity must be exactly 1 for customer orders"
    );
    assert!(app.gateway.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn successful_callback_completes_payment_and_sends_invoice_emails() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let payment_id = app.place_order("aroha@example.com").await;
    let order_id = app.order_id_for(payment_id);

    let response = app.complete_payment(payment_id).await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.data()["status"], "completed");
    assert_eq!(response.message(), "Payment completed successfully");

    let replay = app.complete_payment(payment_id).await;
    assert_eq!(replay.status, StatusCode::CONFLICT);
    assert_eq!(replay.body["message"], "Payment already processed");
    assert_eq!(app.gateway.captured.lock().unwrap().len(), 1);

    app.drain_outbox().await;
    let confirmations = app.mailer.sent_to("aroha@example.com");
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].subject, "Order Confirmation");
    assert_eq!(app.mailer.sent_to(CLIENT_EMAIL).len(), 1);

    let detail = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None, Some(&token))
        .await;
    assert_eq!(detail.status, StatusCode::OK, "{}", detail.body);
    let order = detail.data();
    assert_eq!(order["payment_status"], "Completed");
    assert_eq!(decimal(&order["total_price"]), Decimal::from_str("199.00").unwrap());

    let link = order["payments"][0]["invoices"][0]["invoice_link"]
        .as_str()
        .expect("invoice link");
    let file_name = link.strip_prefix("http://api.test/files/").expect("served from /files");
    assert!(app.file_exists(file_name));
}

#[tokio::test]
async fn declined_capture_reports_payment_required() {
    let app = TestApp::new().await;
    app.gateway.decline_captures();
    let payment_id = app.place_order("aroha@example.com").await;

    let response = app.complete_payment(payment_id).await;

    assert_eq!(response.status, StatusCode::PAYMENT_REQUIRED);
    assert!(response.body["message"]
        .as_str()
        .unwrap()
        .starts_with("Payment processing failed"));

    let retry = app.complete_payment(payment_id).await;
    assert_eq!(retry.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelled_callback_cancels_the_order() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let payment_id = app.place_order("aroha@example.com").await;
    let order_id = app.order_id_for(payment_id);

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/payments/callback?payment_id={}&token=PP-{}&action=cancel",
                payment_id, payment_id
            ),
            None,
            None,
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["status"], "cancelled");

    let detail = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None, Some(&token))
        .await;
    assert_eq!(detail.data()["order_status"], "Cancelled");
    assert!(app.gateway.captured.lock().unwrap().is_empty());
}

#[tokio::test]
async fn callback_without_parameters_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/payments/callback?action=success", None, None)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body["message"],
        "payment_id, token and action are required"
    );
}

#[tokio::test]
async fn assigning_barcodes_moves_the_order_through_dispatch() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;
    let payment_id = app.place_order("aroha@example.com").await;
    let order_id = app.order_id_for(payment_id);

    let unpaid = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/barcodes", order_id),
            Some(json!({ "barcodes": [barcode(1)] })),
            Some(&token),
        )
        .await;
    assert_eq!(unpaid.status, StatusCode::BAD_REQUEST);

    app.complete_payment(payment_id).await;

    let assigned = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/barcodes", order_id),
            Some(json!({ "barcodes": barcode(1) })),
            Some(&token),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::OK, "{}", assigned.body);
    assert_eq!(assigned.data()["assigned"], 1);

    let too_many = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/barcodes", order_id),
            Some(json!({ "barcodes": [barcode(2)] })),
            Some(&token),
        )
        .await;
    assert_eq!(too_many.status, StatusCode::CONFLICT);

    let skip = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "order_status": "Delivered" })),
            Some(&token),
        )
        .await;
    assert_eq!(skip.status, StatusCode::BAD_REQUEST);

    let dispatched = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "order_status": "Dispatched", "tracking_id": "NZ123456" })),
            Some(&token),
        )
        .await;
    assert_eq!(dispatched.status, StatusCode::OK, "{}", dispatched.body);
    assert_eq!(dispatched.data()["order_status"], "Dispatched");

    let lookup = app
        .request(
            Method::GET,
            &format!("/api/v1/barcodes/{}", barcode(1)),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(lookup.status, StatusCode::OK, "{}", lookup.body);

    let counts = app
        .request(Method::GET, "/api/v1/orders/counts", None, Some(&token))
        .await;
    assert_eq!(counts.status, StatusCode::OK);

    let listed = app
        .request(
            Method::GET,
            "/api/v1/orders?order_status=Dispatched&page=1&per_page=10",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(listed.status, StatusCode::OK, "{}", listed.body);
    assert_eq!(listed.data()["total"], 1);
    assert_eq!(listed.data()["items"][0]["tracking_id"], "NZ123456");
}

#[tokio::test]
async fn quantity_discounts_are_public() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/v1/quantity-discounts", None, None)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(!response.data().as_array().unwrap().is_empty());
}
