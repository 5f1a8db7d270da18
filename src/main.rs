use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::{
    signal,
    sync::{mpsc, Notify},
};
use tracing::{error, info, warn};

use theranostics_api as api;
use api::{
    events::outbox::{self, OutboxHandler},
    notifications::{dispatcher::NotificationDispatcher, HttpMailer, LogMailer, Mailer},
    services::{invoices::InvoiceService, log_cleanup, paypal::PayPalGateway, payments::PaymentGateway},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    tokio::fs::create_dir_all(&cfg.files_dir)
        .await
        .with_context(|| format!("failed to create files directory {}", cfg.files_dir))?;

    let cipher = cfg.cipher().context("invalid encryption keys")?;

    // Init events
    let outbox_wake = Arc::new(Notify::new());
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx, outbox_wake.clone()));

    // Payment gateway
    if cfg.paypal_client_id.is_empty() || cfg.paypal_client_secret.is_empty() {
        warn!("PayPal credentials are not configured; checkout will fail at the gateway");
    }
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PayPalGateway::new(
        cfg.paypal_api_url.clone(),
        cfg.paypal_client_id.clone(),
        cfg.paypal_client_secret.clone(),
    )?);

    // Mail delivery through the outbox
    let mailer: Arc<dyn Mailer> = match cfg.mail_relay_url.as_deref() {
        Some(relay) => {
            info!("Mail relay configured at {}", relay);
            Arc::new(HttpMailer::new(relay, cfg.mail_from.clone())?)
        }
        None => {
            warn!("No mail relay configured; emails will only be logged");
            Arc::new(LogMailer)
        }
    };
    let invoices = InvoiceService::new(
        db.clone(),
        PathBuf::from(&cfg.files_dir),
        cfg.api_url.clone(),
    );
    let dispatcher: Arc<dyn OutboxHandler> = Arc::new(NotificationDispatcher::new(
        db.clone(),
        mailer,
        invoices,
        cfg.client_email.clone(),
    ));
    outbox::start_worker(db.clone(), dispatcher, outbox_wake);

    log_cleanup::start(db.clone(), log_cleanup::DAILY);

    // Auth
    let auth_service = Arc::new(api::auth::AuthService::new(
        db.clone(),
        api::auth::AuthConfig {
            jwt_secret: cfg.jwt_secret.clone(),
            token_ttl_secs: cfg.jwt_expiration as i64,
        },
    ));
    if let (Some(email), Some(password)) = (
        cfg.bootstrap_admin_email.as_deref(),
        cfg.bootstrap_admin_password.as_deref(),
    ) {
        if auth_service.ensure_bootstrap_admin(email, password).await? {
            info!("Created bootstrap admin {}", email);
        }
    }

    // Aggregate app services used by HTTP handlers
    let services = api::handlers::AppServices::new(
        db.clone(),
        &cfg,
        cipher,
        gateway,
        Some(event_sender),
    );

    let port = cfg.port;
    let app_state = api::AppState {
        db: db.clone(),
        config: Arc::new(cfg),
        auth: auth_service,
        services,
    };
    let app = api::build_router(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("theranostics-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
