use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::errors::ServiceError;
use crate::services::payments::{CaptureOutcome, PaymentGateway, PaymentOrder, PaymentOrderRequest};

pub const SANDBOX_API_URL: &str = "https://api-m.sandbox.paypal.com";
const BRAND_NAME: &str = "Theranostics DNA";
const CURRENCY: &str = "USD";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// PayPal Orders v2 client.
#[derive(Clone)]
pub struct PayPalGateway {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl PayPalGateway {
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Client-credentials token, reused until shortly before it expires.
    async fn access_token(&self) -> Result<String, ServiceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("PayPal token request returned {}: {}", status, body);
            return Err(ServiceError::ExternalServiceError(format!(
                "PayPal authentication failed with status {}",
                status
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Invalid PayPal token response: {}", e)))?;

        let lifetime = (token.expires_in - 60).max(0);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        });
        Ok(token.access_token)
    }

    fn order_body(request: &PaymentOrderRequest) -> serde_json::Value {
        let b = &request.breakdown;
        let amount = |value: rust_decimal::Decimal| json!({ "currency_code": CURRENCY, "value": format!("{:.2}", value) });
        json!({
            "intent": "CAPTURE",
            "application_context": {
                "return_url": request.return_url,
                "cancel_url": request.cancel_url,
                "brand_name": BRAND_NAME,
                "shipping_preference": "NO_SHIPPING",
                "user_action": "PAY_NOW",
            },
            "purchase_units": [{
                "reference_id": request.payment_id.to_string(),
                "custom_id": format!("ORDER_{}", request.order_id),
                "description": request.product_description.clone().unwrap_or_else(|| request.product_name.clone()),
                "amount": {
                    "currency_code": CURRENCY,
                    "value": format!("{:.2}", b.total),
                    "breakdown": {
                        "item_total": amount(b.subtotal),
                        "tax_total": amount(b.tax),
                        "shipping": amount(rust_decimal::Decimal::ZERO),
                        "discount": amount(b.discount),
                    }
                },
                "items": [{
                    "name": request.product_name,
                    "quantity": b.quantity.to_string(),
                    "unit_amount": amount(b.unit_price),
                    "tax": amount(request.gst_price),
                    "category": "PHYSICAL_GOODS",
                }]
            }]
        })
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    #[instrument(skip(self, request), fields(payment_id = request.payment_id, order_id = request.order_id))]
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentOrder, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.api_url))
            .bearer_auth(token)
            .json(&Self::order_body(request))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal order request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("PayPal create order returned {}: {}", status, body);
            return Err(ServiceError::ExternalServiceError(format!(
                "PayPal order creation failed with status {}",
                status
            )));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Invalid PayPal order response: {}", e)))?;

        let approval_url = order
            .links
            .into_iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href)
            .ok_or_else(|| ServiceError::ExternalServiceError("PayPal returned no approval link".to_string()))?;

        info!(gateway_order_id = %order.id, "PayPal order created");
        Ok(PaymentOrder {
            id: order.id,
            approval_url,
        })
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, gateway_order_id: &str) -> Result<CaptureOutcome, ServiceError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_url, gateway_order_id
            ))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("PayPal capture request failed: {}", e)))?;

        let http_status = response.status();
        if http_status != reqwest::StatusCode::OK && http_status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            error!("PayPal capture returned {}: {}", http_status, body);
            return Ok(CaptureOutcome {
                status: format!("HTTP_{}", http_status.as_u16()),
                detail: Some(format!("Payment capture failed with status {}", http_status)),
            });
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("Invalid PayPal capture response: {}", e)))?;

        let status = order.status.unwrap_or_default();
        info!(gateway_order_id = %order.id, %status, "PayPal capture finished");
        let detail = (status != "COMPLETED")
            .then(|| format!("Payment capture returned status {}", status));
        Ok(CaptureOutcome { status, detail })
    }
}
