pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_access_tables;
mod m20250101_000002_create_catalog_tables;
mod m20250101_000003_create_order_tables;
mod m20250101_000004_create_kit_registrations_table;
mod m20250101_000005_create_notification_tables;
mod m20250101_000006_create_outbox_table;
mod m20250101_000007_seed_reference_data;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_access_tables::Migration),
            Box::new(m20250101_000002_create_catalog_tables::Migration),
            Box::new(m20250101_000003_create_order_tables::Migration),
            Box::new(m20250101_000004_create_kit_registrations_table::Migration),
            Box::new(m20250101_000005_create_notification_tables::Migration),
            Box::new(m20250101_000006_create_outbox_table::Migration),
            Box::new(m20250101_000007_seed_reference_data::Migration),
        ]
    }
}
