//! Add selection priority and persisted per-collection stickiness to
//! cache folders.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(CacheFolders::Table)
                    .add_column(
                        ColumnDef::new(CacheFolders::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .add_column(ColumnDef::new(CacheFolders::CachedCollectionIds).blob(BlobSize::Medium))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(CacheFolders::Table)
                    .drop_column(CacheFolders::Priority)
                    .drop_column(CacheFolders::CachedCollectionIds)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum CacheFolders {
    Table,
    Priority,
    CachedCollectionIds,
}
