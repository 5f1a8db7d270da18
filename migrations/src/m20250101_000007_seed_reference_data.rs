use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_access_tables::Roles;
use super::m20250101_000002_create_catalog_tables::QuantityDiscounts;

const ROLES: [&str; 3] = ["super-admin", "admin", "user"];

#[derive(DeriveMigrationName)]
pub struct Migration;

fn build_err(err: impl std::fmt::Display) -> DbErr {
    DbErr::Custom(format!("failed to build seed statement: {err}"))
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let mut roles = Query::insert();
        roles.into_table(Roles::Table).columns([Roles::Name]);
        for role in ROLES {
            roles.values([role.into()]).map_err(build_err)?;
        }
        manager.exec_stmt(roles).await?;

        let discount = Query::insert()
            .into_table(QuantityDiscounts::Table)
            .columns([QuantityDiscounts::Quantity, QuantityDiscounts::Discount])
            .values([100.into(), Expr::cust("15.00")])
            .map_err(build_err)?
            .to_owned();
        manager.exec_stmt(discount).await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .exec_stmt(
                Query::delete()
                    .from_table(QuantityDiscounts::Table)
                    .and_where(Expr::col(QuantityDiscounts::Quantity).eq(100))
                    .to_owned(),
            )
            .await?;
        manager
            .exec_stmt(
                Query::delete()
                    .from_table(Roles::Table)
                    .and_where(Expr::col(Roles::Name).is_in(ROLES))
                    .to_owned(),
            )
            .await
    }
}
