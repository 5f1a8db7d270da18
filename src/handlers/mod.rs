pub mod auth;
pub mod common;
pub mod discounts;
pub mod health;
pub mod inventory;
pub mod kit_registrations;
pub mod labs;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;

use sea_orm::DatabaseConnection;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::crypto::DoubleCipher;
use crate::events::EventSender;
use crate::services::{
    barcodes::BarcodeService,
    discounts::DiscountService,
    inventory::InventoryService,
    kit_registrations::{KitRegistrationService, KitSettings},
    kit_status::KitStatusService,
    labs::LabService,
    notifications::NotificationService,
    order_status::OrderStatusService,
    orders::{OrderService, OrderSettings},
    payments::{PaymentGateway, PaymentService},
    products::ProductService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub barcodes: Arc<BarcodeService>,
    pub kit_registrations: Arc<KitRegistrationService>,
    pub kit_status: Arc<KitStatusService>,
    pub inventory: Arc<InventoryService>,
    pub labs: Arc<LabService>,
    pub discounts: Arc<DiscountService>,
    pub notifications: Arc<NotificationService>,
    pub products: Arc<ProductService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cfg: &AppConfig,
        cipher: DoubleCipher,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let kit_settings = KitSettings {
            client_email: cfg.client_email.clone(),
            files_dir: PathBuf::from(&cfg.files_dir),
            api_url: cfg.api_url.clone(),
        };
        let order_settings = OrderSettings {
            order_number_prefix: cfg.order_number_prefix.clone(),
            app_url: cfg.app_url.clone(),
        };

        Self {
            orders: Arc::new(OrderService::new(
                db.clone(),
                gateway.clone(),
                order_settings,
                event_sender.clone(),
            )),
            order_status: Arc::new(OrderStatusService::new(db.clone(), event_sender.clone())),
            payments: Arc::new(PaymentService::new(db.clone(), gateway, event_sender.clone())),
            barcodes: Arc::new(BarcodeService::new(db.clone(), cipher.clone())),
            kit_registrations: Arc::new(KitRegistrationService::new(
                db.clone(),
                cipher.clone(),
                kit_settings.clone(),
                event_sender.clone(),
            )),
            kit_status: Arc::new(KitStatusService::new(
                db.clone(),
                cipher.clone(),
                kit_settings,
                event_sender,
            )),
            inventory: Arc::new(InventoryService::new(db.clone())),
            labs: Arc::new(LabService::new(db.clone())),
            discounts: Arc::new(DiscountService::new(db.clone())),
            notifications: Arc::new(NotificationService::new(db)),
            products: Arc::new(ProductService::new(cipher)),
        }
    }
}
