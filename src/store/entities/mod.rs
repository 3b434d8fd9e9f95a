//! Sea-ORM entity definitions.
//!
//! These map the document store's tables to typed models. Array- and
//! map-valued columns (stage tables, image/thumbnail manifests) are stored
//! as MessagePack blobs rather than normalized child tables, since they are
//! always read and written whole by exactly one owning job.

pub mod background_job;
pub mod cache_folder;
pub mod collection;
pub mod dead_letter_message;
pub mod file_processing_job_state;
pub mod library;
pub mod queue_message;
pub mod scheduled_job;

pub use background_job::Entity as BackgroundJob;
pub use cache_folder::Entity as CacheFolder;
pub use collection::Entity as Collection;
pub use dead_letter_message::Entity as DeadLetterMessage;
pub use file_processing_job_state::Entity as FileProcessingJobState;
pub use library::Entity as Library;
pub use queue_message::Entity as QueueMessage;
pub use scheduled_job::Entity as ScheduledJob;
