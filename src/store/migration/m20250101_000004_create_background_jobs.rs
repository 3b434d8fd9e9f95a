//! Create the background_jobs table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackgroundJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackgroundJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BackgroundJobs::CollectionId).uuid().not_null())
                    .col(ColumnDef::new(BackgroundJobs::JobType).text().not_null())
                    .col(
                        ColumnDef::new(BackgroundJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(BackgroundJobs::Stages)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BackgroundJobs::Attempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BackgroundJobs::Error).text())
                    .col(
                        ColumnDef::new(BackgroundJobs::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BackgroundJobs::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BackgroundJobs::StartedAt).timestamp())
                    .col(ColumnDef::new(BackgroundJobs::CompletedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_background_jobs_collection_id")
                            .from(BackgroundJobs::Table, BackgroundJobs::CollectionId)
                            .to(Collections::Table, Collections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_background_jobs_status")
                    .table(BackgroundJobs::Table)
                    .col(BackgroundJobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_background_jobs_collection_id")
                    .table(BackgroundJobs::Table)
                    .col(BackgroundJobs::CollectionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BackgroundJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BackgroundJobs {
    Table,
    Id,
    CollectionId,
    JobType,
    Status,
    Stages,
    Attempt,
    Error,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Collections {
    Table,
    Id,
}
