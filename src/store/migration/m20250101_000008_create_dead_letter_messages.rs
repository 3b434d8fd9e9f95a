//! Create the dead_letter_messages table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeadLetterMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeadLetterMessages::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeadLetterMessages::Queue).text().not_null())
                    .col(
                        ColumnDef::new(DeadLetterMessages::Payload)
                            .blob(BlobSize::Medium)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeadLetterMessages::Error).text().not_null())
                    .col(
                        ColumnDef::new(DeadLetterMessages::Attempts)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeadLetterMessages::FailedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeadLetterMessages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeadLetterMessages {
    Table,
    Id,
    Queue,
    Payload,
    Error,
    Attempts,
    FailedAt,
}
