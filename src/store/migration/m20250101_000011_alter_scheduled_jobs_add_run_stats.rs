//! Add operator controls and run accounting to scheduled jobs.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(ScheduledJobs::Table)
                    .add_column(
                        ColumnDef::new(ScheduledJobs::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .add_column(
                        ColumnDef::new(ScheduledJobs::RunCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .add_column(
                        ColumnDef::new(ScheduledJobs::SuccessCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .add_column(
                        ColumnDef::new(ScheduledJobs::FailureCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .add_column(ColumnDef::new(ScheduledJobs::LastRunDurationMs).big_integer())
                    .add_column(ColumnDef::new(ScheduledJobs::ExternalBinding).text())
                    .add_column(ColumnDef::new(ScheduledJobs::Parameters).blob(BlobSize::Medium))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(ScheduledJobs::Table)
                    .drop_column(ScheduledJobs::Enabled)
                    .drop_column(ScheduledJobs::RunCount)
                    .drop_column(ScheduledJobs::SuccessCount)
                    .drop_column(ScheduledJobs::FailureCount)
                    .drop_column(ScheduledJobs::LastRunDurationMs)
                    .drop_column(ScheduledJobs::ExternalBinding)
                    .drop_column(ScheduledJobs::Parameters)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum ScheduledJobs {
    Table,
    Enabled,
    RunCount,
    SuccessCount,
    FailureCount,
    LastRunDurationMs,
    ExternalBinding,
    Parameters,
}
