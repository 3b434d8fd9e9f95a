//! Create the file_processing_job_states table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FileProcessingJobStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FileProcessingJobStates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::CollectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::ImageId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::Images)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::Thumbnails)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::CacheImages)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(FileProcessingJobStates::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_file_processing_job_states_collection_id")
                            .from(
                                FileProcessingJobStates::Table,
                                FileProcessingJobStates::CollectionId,
                            )
                            .to(Collections::Table, Collections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_file_processing_job_states_collection_image_unique")
                    .table(FileProcessingJobStates::Table)
                    .col(FileProcessingJobStates::CollectionId)
                    .col(FileProcessingJobStates::ImageId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(FileProcessingJobStates::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum FileProcessingJobStates {
    Table,
    Id,
    CollectionId,
    ImageId,
    Images,
    Thumbnails,
    CacheImages,
    Status,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Collections {
    Table,
    Id,
}
