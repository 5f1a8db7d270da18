use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_access_tables::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QuantityDiscounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QuantityDiscounts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QuantityDiscounts::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(QuantityDiscounts::Discount)
                            .decimal_len(5, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QuantityDiscounts::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(QuantityDiscounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(QuantityDiscounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Kits::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Kits::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Kits::KitType).string_len(20).not_null())
                    .col(ColumnDef::new(Kits::SupplierName).string_len(50).not_null())
                    .col(ColumnDef::new(Kits::SupplierContactNumber).string_len(15).null())
                    .col(ColumnDef::new(Kits::SupplierAddress).string_len(100).null())
                    .col(ColumnDef::new(Kits::Quantity).integer().not_null().default(0))
                    .col(ColumnDef::new(Kits::Status).boolean().not_null().default(true))
                    .col(ColumnDef::new(Kits::CreatedBy).integer().not_null())
                    .col(ColumnDef::new(Kits::IsDeleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Kits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Kits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_kits_created_by")
                            .from(Kits::Table, Kits::CreatedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_kits_type")
                    .table(Kits::Table)
                    .col(Kits::KitType)
                    .col(Kits::IsDeleted)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Labs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Labs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Labs::LabName).string_len(255).not_null())
                    .col(ColumnDef::new(Labs::LabAddress).string_len(255).not_null())
                    .col(ColumnDef::new(Labs::NhiNumber).string_len(10).not_null())
                    .col(ColumnDef::new(Labs::IsDeleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Labs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Labs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Labs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Kits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QuantityDiscounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum QuantityDiscounts {
    Table,
    Id,
    Quantity,
    Discount,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Kits {
    Table,
    Id,
    KitType,
    SupplierName,
    SupplierContactNumber,
    SupplierAddress,
    Quantity,
    Status,
    CreatedBy,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Labs {
    Table,
    Id,
    LabName,
    LabAddress,
    NhiNumber,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}
