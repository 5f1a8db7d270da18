#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use theranostics_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    crypto::DoubleCipher,
    db::{self, DbConfig},
    events::outbox,
    handlers::AppServices,
    notifications::{
        dispatcher::NotificationDispatcher, EmailMessage, MailError, Mailer,
    },
    services::{
        invoices::InvoiceService,
        payments::{CaptureOutcome, PaymentGateway, PaymentOrder, PaymentOrderRequest},
    },
    errors::ServiceError,
    AppState,
};

pub const KEY1: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
pub const KEY2: &str = "ZmVkY2JhOTg3NjU0MzIxMGZlZGNiYTk4NzY1NDMyMTA=";
pub const ADMIN_EMAIL: &str = "admin@theranostics.test";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery";
pub const CLIENT_EMAIL: &str = "orders@theranostics.test";

/// Gateway double that approves every order and answers captures with a
/// fixed status.
pub struct ScriptedGateway {
    capture_status: Mutex<String>,
    pub created: Mutex<Vec<PaymentOrderRequest>>,
    pub captured: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            capture_status: Mutex::new("COMPLETED".into()),
            created: Mutex::new(Vec::new()),
            captured: Mutex::new(Vec::new()),
        }
    }

    pub fn decline_captures(&self) {
        *self.capture_status.lock().unwrap() = "DECLINED".into();
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentOrder, ServiceError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(PaymentOrder {
            id: format!("PP-{}", request.payment_id),
            approval_url: format!("https://gateway.test/approve/{}", request.payment_id),
        })
    }

    async fn capture_order(&self, gateway_order_id: &str) -> Result<CaptureOutcome, ServiceError> {
        self.captured.lock().unwrap().push(gateway_order_id.to_string());
        let status = self.capture_status.lock().unwrap().clone();
        let detail = (status != "COMPLETED").then(|| "Instrument declined".to_string());
        Ok(CaptureOutcome { status, detail })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }

    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.to.iter().any(|to| to == address))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Application harness over a migrated in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<ScriptedGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub cipher: DoubleCipher,
    dispatcher: NotificationDispatcher,
    pub files: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

impl TestApp {
    pub async fn new() -> Self {
        let files = tempfile::tempdir().expect("temp dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "integration-test-secret-with-enough-length".to_string(),
            KEY1.to_string(),
            KEY2.to_string(),
            "test".to_string(),
        );
        cfg.files_dir = files.path().to_string_lossy().into_owned();
        cfg.api_url = "http://api.test".to_string();
        cfg.app_url = "http://shop.test".to_string();
        cfg.client_email = Some(CLIENT_EMAIL.to_string());

        // One connection keeps every query on the same in-memory database.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let cipher = cfg.cipher().expect("test keys");
        let gateway = Arc::new(ScriptedGateway::new());
        let mailer = Arc::new(RecordingMailer::default());

        let auth = Arc::new(AuthService::new(
            db.clone(),
            AuthConfig {
                jwt_secret: cfg.jwt_secret.clone(),
                token_ttl_secs: 3600,
            },
        ));
        auth.ensure_bootstrap_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("bootstrap admin");

        let dispatcher = NotificationDispatcher::new(
            db.clone(),
            mailer.clone(),
            InvoiceService::new(db.clone(), files.path().to_path_buf(), cfg.api_url.clone()),
            cfg.client_email.clone(),
        );

        let services =
            AppServices::new(db.clone(), &cfg, cipher.clone(), gateway.clone(), None);
        let state = AppState {
            db,
            config: Arc::new(cfg),
            auth,
            services,
        };

        Self {
            router: theranostics_api::build_router(state.clone()),
            state,
            gateway,
            mailer,
            cipher,
            dispatcher,
            files,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse { status, body }
    }

    pub async fn admin_token(&self) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.data()["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }

    /// Delivers everything queued in the outbox.
    pub async fn drain_outbox(&self) {
        // Confirmed payments queue their emails, which need a second pass.
        for _ in 0..3 {
            outbox::drain_once(&self.state.db, &self.dispatcher, 100)
                .await
                .expect("outbox drain");
        }
    }

    pub fn file_exists(&self, name: &str) -> bool {
        Path::new(&self.state.config.files_dir).join(name).exists()
    }

    /// A customer checkout for a single kit.
    pub fn checkout(email: &str) -> Value {
        json!({
            "first_name": "Aroha",
            "last_name": "Ngata",
            "email": email,
            "phone_number": "0211234567",
            "country": "New Zealand",
            "street_address": "12 Queen Street",
            "town_city": "Auckland",
            "region": "Auckland",
            "postcode": "1010",
            "shipping_country": "New Zealand",
            "shipping_address": "12 Queen Street",
            "shipping_town_city": "Auckland",
            "shipping_region": "Auckland",
            "shipping_postcode": "1010",
            "product_name": "DNA Health Kit",
            "product_description": "Saliva based DNA test",
            "product_price": "199.00",
            "product_gst_price": "25.96",
            "quantity": 1,
            "type": "customer"
        })
    }

    /// Places a checkout and returns the payment id parsed from the approval URL.
    pub async fn place_order(&self, email: &str) -> i32 {
        let response = self
            .request(Method::POST, "/api/v1/orders", Some(Self::checkout(email)), None)
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        let created = self.gateway.created.lock().unwrap();
        created.last().expect("gateway order").payment_id
    }

    pub async fn complete_payment(&self, payment_id: i32) -> TestResponse {
        self.request(
            Method::GET,
            &format!(
                "/api/v1/payments/callback?payment_id={}&token=PP-{}&action=success",
                payment_id, payment_id
            ),
            None,
            None,
        )
        .await
    }

    pub fn order_id_for(&self, payment_id: i32) -> i32 {
        self.gateway
            .created
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.payment_id == payment_id)
            .expect("gateway order for payment")
            .order_id
    }
}

/// A valid 30 character barcode derived from `n`.
pub fn barcode(n: usize) -> String {
    format!("TK{:0>28}", n)
}
