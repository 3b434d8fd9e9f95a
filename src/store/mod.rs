//! Document store: entities, migrations and the atomic operators that sit
//! on top of them.
//!
//! Every table is reached through a typed `*_store` module rather than raw
//! `sea_orm::EntityTrait` calls scattered through the worker code - each
//! store module owns the SQL needed to make its operators a single
//! round-trip, since that is what keeps concurrent workers from racing each
//! other on the same row.

pub mod entities;
pub mod error;
pub mod migration;

pub mod background_job_store;
pub mod cache_folder_store;
pub mod collection_store;
pub mod file_processing_job_state_store;
pub mod library_store;
pub mod scheduled_job_store;

pub use background_job_store::BackgroundJobStore;
pub use error::{StoreError, StoreResult};
pub use cache_folder_store::CacheFolderStore;
pub use collection_store::CollectionStore;
pub use file_processing_job_state_store::FileProcessingJobStateStore;
pub use library_store::LibraryStore;
pub use scheduled_job_store::ScheduledJobStore;

/// An in-memory SQLite connection with every migration applied - shared
/// across this module's own tests and the workers/reconciler/scheduler
/// tests that exercise the store through a real connection.
#[cfg(test)]
pub(crate) async fn test_db() -> sea_orm::DatabaseConnection {
    use sea_orm_migration::MigratorTrait;

    let db = sea_orm::Database::connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    migration::Migrator::up(&db, None)
        .await
        .expect("run migrations");
    db
}
