use base64::{engine::general_purpose::STANDARD, Engine as _};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::crypto::{CryptoError, DoubleCipher};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_FILES_DIR: &str = "public/files";
const DEFAULT_ORDER_PREFIX: &str = "SL";
const DEFAULT_PAYPAL_API_URL: &str = "https://api-m.sandbox.paypal.com";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application environment
    pub environment: String,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// HS256 signing secret for staff tokens
    #[validate(custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Token lifetime in seconds
    #[validate(range(min = 300, max = 604800))]
    pub jwt_expiration: usize,

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Public frontend URL, used for payment return URLs and email links
    #[validate(url)]
    pub app_url: String,

    /// Public base URL of this API, used for `/files/...` links
    #[validate(url)]
    pub api_url: String,

    /// Directory holding uploaded reports and rendered invoices
    #[serde(default = "default_files_dir")]
    pub files_dir: String,

    /// First-pass patient data key (base64, 32 bytes)
    #[validate(custom = "validate_encryption_key")]
    pub encryption_key1: String,

    /// Second-pass patient data key (base64, 32 bytes)
    #[validate(custom = "validate_encryption_key")]
    pub encryption_key2: String,

    #[serde(default)]
    pub paypal_client_id: String,

    #[serde(default)]
    pub paypal_client_secret: String,

    #[serde(default = "default_paypal_api_url")]
    #[validate(url)]
    pub paypal_api_url: String,

    /// Optional admin mailbox copied on new orders
    #[serde(default)]
    #[validate(email)]
    pub client_email: Option<String>,

    /// HTTP mail relay; when unset emails are only logged
    #[serde(default)]
    #[validate(url)]
    pub mail_relay_url: Option<String>,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Super-admin created on first start when both are set
    #[serde(default)]
    #[validate(email)]
    pub bootstrap_admin_email: Option<String>,

    #[serde(default)]
    #[validate(length(min = 8))]
    pub bootstrap_admin_password: Option<String>,

    /// Prefix of order and invoice numbers
    #[serde(default = "default_order_number_prefix")]
    #[validate(length(min = 1, max = 10))]
    pub order_number_prefix: String,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the
    /// connection string, secrets and environment.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        encryption_key1: String,
        encryption_key2: String,
        environment: String,
    ) -> Self {
        Self {
            environment,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            log_level: default_log_level(),
            log_json: false,
            database_url,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            jwt_secret,
            jwt_expiration: 3600,
            cors_allowed_origins: None,
            app_url: "http://localhost:3000".to_string(),
            api_url: format!("http://localhost:{}", DEFAULT_PORT),
            files_dir: default_files_dir(),
            encryption_key1,
            encryption_key2,
            paypal_client_id: String::new(),
            paypal_client_secret: String::new(),
            paypal_api_url: default_paypal_api_url(),
            client_email: None,
            mail_relay_url: None,
            mail_from: default_mail_from(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
            order_number_prefix: default_order_number_prefix(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Builds the patient data cipher from the configured keys.
    pub fn cipher(&self) -> Result<DoubleCipher, CryptoError> {
        DoubleCipher::from_base64_keys(&self.encryption_key1, &self.encryption_key2)
    }

    /// Public link for a file stored under `files_dir`.
    pub fn file_url(&self, file_name: &str) -> String {
        format!("{}/files/{}", self.api_url.trim_end_matches('/'), file_name)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message =
                Some("Set APP__CORS_ALLOWED_ORIGINS for non-development environments".into());
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development()
            && (self.paypal_client_id.trim().is_empty()
                || self.paypal_client_secret.trim().is_empty())
        {
            let mut err = ValidationError::new("paypal_credentials_required");
            err.message = Some(
                "Set APP__PAYPAL_CLIENT_ID and APP__PAYPAL_CLIENT_SECRET outside development"
                    .into(),
            );
            errors.add("paypal_client_id", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_files_dir() -> String {
    DEFAULT_FILES_DIR.to_string()
}

fn default_paypal_api_url() -> String {
    DEFAULT_PAYPAL_API_URL.to_string()
}

fn default_mail_from() -> String {
    "Theranostics DNA <no-reply@theranostics.local>".to_string()
}

fn default_order_number_prefix() -> String {
    DEFAULT_ORDER_PREFIX.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be at least 32 characters".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    Ok(())
}

fn validate_encryption_key(key: &str) -> Result<(), ValidationError> {
    match STANDARD.decode(key.trim()) {
        Ok(bytes) if bytes.len() == 32 => Ok(()),
        _ => {
            let mut err = ValidationError::new("encryption_key");
            err.message = Some("Encryption keys must be base64 that decodes to 32 bytes".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("theranostics_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // Secrets (jwt_secret, encryption keys) have no defaults on purpose.
    let config = Config::builder()
        .set_default("database_url", "sqlite://theranostics.db?mode=rwc")?
        .set_default("jwt_expiration", 86400)?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("app_url", "http://localhost:3000")?
        .set_default("api_url", format!("http://localhost:{}", DEFAULT_PORT))?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
