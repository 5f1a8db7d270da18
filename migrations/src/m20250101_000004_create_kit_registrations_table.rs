use sea_orm_migration::prelude::*;

use super::m20250101_000002_create_catalog_tables::Labs;
use super::m20250101_000003_create_order_tables::{Barcodes, Customers, Orders};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KitRegistrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KitRegistrations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KitRegistrations::BarcodeId).integer().not_null())
                    .col(ColumnDef::new(KitRegistrations::OrderId).integer().not_null())
                    .col(ColumnDef::new(KitRegistrations::CustomerId).integer().not_null())
                    .col(ColumnDef::new(KitRegistrations::LabId).integer().null())
                    // Patient fields hold ciphertext, so no length caps.
                    .col(ColumnDef::new(KitRegistrations::FirstName).text().not_null())
                    .col(ColumnDef::new(KitRegistrations::LastName).text().null())
                    .col(ColumnDef::new(KitRegistrations::Email).text().not_null())
                    .col(ColumnDef::new(KitRegistrations::Gender).text().not_null())
                    .col(ColumnDef::new(KitRegistrations::Age).text().not_null())
                    .col(
                        ColumnDef::new(KitRegistrations::IsClinicInform)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(KitRegistrations::KitStatus)
                            .string_len(20)
                            .not_null()
                            .default("Not-Received"),
                    )
                    .col(ColumnDef::new(KitRegistrations::Reason).text().null())
                    .col(ColumnDef::new(KitRegistrations::FilePath).string().null())
                    .col(
                        ColumnDef::new(KitRegistrations::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(KitRegistrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KitRegistrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kit_registrations_barcode_id")
                            .from(KitRegistrations::Table, KitRegistrations::BarcodeId)
                            .to(Barcodes::Table, Barcodes::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kit_registrations_order_id")
                            .from(KitRegistrations::Table, KitRegistrations::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kit_registrations_customer_id")
                            .from(KitRegistrations::Table, KitRegistrations::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kit_registrations_lab_id")
                            .from(KitRegistrations::Table, KitRegistrations::LabId)
                            .to(Labs::Table, Labs::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // One live registration per physical kit; concurrent duplicates surface
        // as a conflict. Soft-deleted rows stay out of the index.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX uq_kit_registrations_kit \
                 ON kit_registrations (barcode_id, order_id, customer_id) \
                 WHERE NOT is_deleted",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KitRegistrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum KitRegistrations {
    Table,
    Id,
    BarcodeId,
    OrderId,
    CustomerId,
    LabId,
    FirstName,
    LastName,
    Email,
    Gender,
    Age,
    IsClinicInform,
    KitStatus,
    Reason,
    FilePath,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}
