//! Create the collections table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Collections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Collections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Collections::LibraryId).uuid().not_null())
                    .col(ColumnDef::new(Collections::Path).text().not_null())
                    .col(
                        ColumnDef::new(Collections::Status)
                            .text()
                            .not_null()
                            .default("discovered"),
                    )
                    .col(
                        ColumnDef::new(Collections::Statistics)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Collections::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Collections::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_collections_library_id")
                            .from(Collections::Table, Collections::LibraryId)
                            .to(Libraries::Table, Libraries::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_collections_library_path_unique")
                    .table(Collections::Table)
                    .col(Collections::LibraryId)
                    .col(Collections::Path)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Collections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Collections {
    Table,
    Id,
    LibraryId,
    Path,
    Status,
    Statistics,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Libraries {
    Table,
    Id,
}
