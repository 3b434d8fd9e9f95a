//! Create the cache_folders table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CacheFolders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CacheFolders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CacheFolders::Path)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(CacheFolders::CapacityBytes)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CacheFolders::UsedBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CacheFolders::HighWatermarkRatio)
                            .double()
                            .not_null()
                            .default(0.9),
                    )
                    .col(
                        ColumnDef::new(CacheFolders::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(CacheFolders::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(CacheFolders::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CacheFolders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CacheFolders {
    Table,
    Id,
    Path,
    CapacityBytes,
    UsedBytes,
    HighWatermarkRatio,
    Status,
    CreatedAt,
    UpdatedAt,
}
