//! Create the queue_messages table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(QueueMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QueueMessages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QueueMessages::Queue).text().not_null())
                    .col(
                        ColumnDef::new(QueueMessages::Payload)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QueueMessages::Status)
                            .text()
                            .not_null()
                            .default("ready"),
                    )
                    .col(
                        ColumnDef::new(QueueMessages::AvailableAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(QueueMessages::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(QueueMessages::LockedBy).text())
                    .col(ColumnDef::new(QueueMessages::LockedUntil).timestamp())
                    .col(
                        ColumnDef::new(QueueMessages::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // The claim query filters on (queue, status, available_at) together;
        // this is the index it rides.
        manager
            .create_index(
                Index::create()
                    .name("idx_queue_messages_claim")
                    .table(QueueMessages::Table)
                    .col(QueueMessages::Queue)
                    .col(QueueMessages::Status)
                    .col(QueueMessages::AvailableAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QueueMessages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum QueueMessages {
    Table,
    Id,
    Queue,
    Payload,
    Status,
    AvailableAt,
    Attempts,
    LockedBy,
    LockedUntil,
    CreatedAt,
}
