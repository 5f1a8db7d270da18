use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Customers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Customers::FirstName).string_len(50).not_null())
                    .col(ColumnDef::new(Customers::LastName).string_len(50).null())
                    .col(
                        ColumnDef::new(Customers::Email)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Customers::PhoneNumber).string_len(15).not_null())
                    .col(ColumnDef::new(Customers::Country).string_len(50).not_null())
                    .col(ColumnDef::new(Customers::StreetAddress).string_len(255).not_null())
                    .col(ColumnDef::new(Customers::TownCity).string_len(100).not_null())
                    .col(ColumnDef::new(Customers::Region).string_len(100).not_null())
                    .col(ColumnDef::new(Customers::Postcode).string_len(20).not_null())
                    .col(ColumnDef::new(Customers::ShippingCountry).string_len(50).not_null())
                    .col(
                        ColumnDef::new(Customers::ShippingAddress)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customers::ShippingTownCity)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customers::ShippingRegion)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customers::ShippingPostcode)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Customers::CustomerType).string_len(20).not_null())
                    .col(ColumnDef::new(Customers::ClinicId).string_len(100).null())
                    .col(
                        ColumnDef::new(Customers::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customers::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Orders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Orders::CustomerId).integer().not_null())
                    .col(ColumnDef::new(Orders::ProductName).string_len(100).not_null())
                    .col(ColumnDef::new(Orders::ProductDescription).text().null())
                    .col(ColumnDef::new(Orders::ProductImage).text().null())
                    .col(
                        ColumnDef::new(Orders::ProductPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::ProductGstPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::ProductDiscount)
                            .decimal_len(5, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(Orders::OrderNumber)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::TotalPrice).decimal_len(14, 2).not_null())
                    .col(ColumnDef::new(Orders::PaymentStatus).string_len(20).not_null())
                    .col(ColumnDef::new(Orders::OrderStatus).string_len(20).not_null())
                    .col(ColumnDef::new(Orders::OrderStatusHistory).json().not_null())
                    .col(ColumnDef::new(Orders::TrackingId).string_len(50).null())
                    .col(ColumnDef::new(Orders::IsDeleted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_customer_id")
                            .from(Orders::Table, Orders::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_payment_order_status")
                    .table(Orders::Table)
                    .col(Orders::PaymentStatus)
                    .col(Orders::OrderStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Payments::OrderId).integer().not_null())
                    .col(ColumnDef::new(Payments::PaymentStatus).string_len(20).not_null())
                    .col(ColumnDef::new(Payments::TransactionId).string_len(64).null())
                    .col(ColumnDef::new(Payments::Amount).decimal_len(14, 2).not_null())
                    .col(
                        ColumnDef::new(Payments::ProductGstPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::ProductDiscount)
                            .decimal_len(5, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_order_id")
                            .from(Payments::Table, Payments::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invoices::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Invoices::PaymentId)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Invoices::InvoiceId)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Invoices::InvoiceLink).string().null())
                    .col(ColumnDef::new(Invoices::Price).decimal_len(14, 2).not_null())
                    .col(
                        ColumnDef::new(Invoices::ProductGstPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invoices::ProductDiscount)
                            .decimal_len(5, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invoices::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Invoices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invoices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_invoices_payment_id")
                            .from(Invoices::Table, Invoices::PaymentId)
                            .to(Payments::Table, Payments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Barcodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Barcodes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Barcodes::OrderId).integer().not_null())
                    .col(
                        ColumnDef::new(Barcodes::BarcodeNumber)
                            .string_len(30)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Barcodes::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Barcodes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Barcodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_barcodes_order_id")
                            .from(Barcodes::Table, Barcodes::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_barcodes_order_id")
                    .table(Barcodes::Table)
                    .col(Barcodes::OrderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Barcodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Customers {
    Table,
    Id,
    FirstName,
    LastName,
    Email,
    PhoneNumber,
    Country,
    StreetAddress,
    TownCity,
    Region,
    Postcode,
    ShippingCountry,
    ShippingAddress,
    ShippingTownCity,
    ShippingRegion,
    ShippingPostcode,
    CustomerType,
    ClinicId,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    CustomerId,
    ProductName,
    ProductDescription,
    ProductImage,
    ProductPrice,
    ProductGstPrice,
    ProductDiscount,
    Quantity,
    OrderNumber,
    TotalPrice,
    PaymentStatus,
    OrderStatus,
    OrderStatusHistory,
    TrackingId,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Payments {
    Table,
    Id,
    OrderId,
    PaymentStatus,
    TransactionId,
    Amount,
    ProductGstPrice,
    ProductDiscount,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Invoices {
    Table,
    Id,
    PaymentId,
    InvoiceId,
    InvoiceLink,
    Price,
    ProductGstPrice,
    ProductDiscount,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Barcodes {
    Table,
    Id,
    OrderId,
    BarcodeNumber,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}
