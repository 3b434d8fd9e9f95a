//! Create the libraries table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Libraries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Libraries::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Libraries::Name).text().not_null())
                    .col(ColumnDef::new(Libraries::RootPath).text().not_null())
                    .col(ColumnDef::new(Libraries::CronExpression).text())
                    .col(
                        ColumnDef::new(Libraries::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Libraries::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Libraries::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_libraries_root_path_unique")
                    .table(Libraries::Table)
                    .col(Libraries::RootPath)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Libraries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Libraries {
    Table,
    Id,
    Name,
    RootPath,
    CronExpression,
    Status,
    CreatedAt,
    UpdatedAt,
}
