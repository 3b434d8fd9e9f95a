//! Database migrations

use sea_orm_migration::prelude::*;

mod m20250101_000001_create_libraries;
mod m20250101_000002_create_scheduled_jobs;
mod m20250101_000003_create_collections;
mod m20250101_000004_create_background_jobs;
mod m20250101_000005_create_file_processing_job_states;
mod m20250101_000006_create_cache_folders;
mod m20250101_000007_create_queue_messages;
mod m20250101_000008_create_dead_letter_messages;
mod m20250101_000009_alter_collections_add_name_kind;
mod m20250101_000010_alter_cache_folders_add_priority_and_stickiness;
mod m20250101_000011_alter_scheduled_jobs_add_run_stats;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_libraries::Migration),
            Box::new(m20250101_000002_create_scheduled_jobs::Migration),
            Box::new(m20250101_000003_create_collections::Migration),
            Box::new(m20250101_000004_create_background_jobs::Migration),
            Box::new(m20250101_000005_create_file_processing_job_states::Migration),
            Box::new(m20250101_000006_create_cache_folders::Migration),
            Box::new(m20250101_000007_create_queue_messages::Migration),
            Box::new(m20250101_000008_create_dead_letter_messages::Migration),
            Box::new(m20250101_000009_alter_collections_add_name_kind::Migration),
            Box::new(m20250101_000010_alter_cache_folders_add_priority_and_stickiness::Migration),
            Box::new(m20250101_000011_alter_scheduled_jobs_add_run_stats::Migration),
        ]
    }
}
