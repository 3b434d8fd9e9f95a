#![allow(warnings)]
//! Pictura Core
//!
//! A resumable media-library ingestion pipeline: a library scheduler fires
//! collection scans on a cron schedule, a scan engine enumerates source
//! images, and a message-driven worker pool generates thumbnail and cache
//! derivatives into managed cache folders - all tracked through a
//! multi-stage job store so progress survives a crash and resumes where it
//! left off.

pub mod broker;
pub mod cache_folders;
pub mod config;
pub mod context;
pub mod image_processing;
pub mod infrastructure;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod workers;

use crate::config::AppConfig;
use crate::context::WorkerContext;
use crate::infrastructure::database::Database;
use crate::infrastructure::events::{Event, EventBus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

/// Assembles every long-lived subsystem - config, document store, broker,
/// event bus - and owns the shutdown signal every worker pool, the
/// scheduler and the reconciler select on.
pub struct Core {
    pub config: Arc<RwLock<AppConfig>>,
    pub db: Arc<Database>,
    pub broker: Arc<broker::Broker>,
    pub events: Arc<EventBus>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Core {
    /// Initialize a new Core instance with the default data directory.
    pub async fn new() -> anyhow::Result<Self> {
        let data_dir = crate::config::default_data_dir()?;
        Self::new_with_config(data_dir).await
    }

    /// Initialize a new Core instance with a custom data directory.
    pub async fn new_with_config(data_dir: PathBuf) -> anyhow::Result<Self> {
        info!("Initializing Pictura Core at {:?}", data_dir);

        let config = AppConfig::load_or_create(&data_dir)?;
        config.ensure_directories()?;
        let store_path = config.store_path();
        let config = Arc::new(RwLock::new(config));

        let db = Database::create(&store_path).await?;
        db.migrate().await?;
        let db = Arc::new(db);

        let broker = Arc::new(broker::Broker::new(Arc::new(db.conn().clone())));
        let events = Arc::new(EventBus::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        events.emit(Event::CoreStarted);

        Ok(Self {
            config,
            db,
            broker,
            events,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Build the shared handle passed into every worker pool, the
    /// scheduler and the reconciler.
    pub fn worker_context(&self) -> WorkerContext {
        WorkerContext::new(
            self.db.clone(),
            self.broker.clone(),
            self.config.clone(),
            self.events.clone(),
            self.shutdown_rx.clone(),
        )
    }

    /// Spawn every worker pool, the library scheduler and the reconciler
    /// as background tasks. Returns their join handles so a caller can
    /// await clean shutdown.
    pub fn spawn_all(&self) -> Vec<JoinHandle<()>> {
        let ctx = self.worker_context();

        vec![
            tokio::spawn(workers::thumbnail::run(ctx.clone(), "thumbnail-0".to_string())),
            tokio::spawn(workers::cache::run(ctx.clone(), "cache-0".to_string())),
            tokio::spawn(workers::collection_scanner::run(
                ctx.clone(),
                "collection-scan-0".to_string(),
            )),
            tokio::spawn(workers::bulk_ingester::run(
                ctx.clone(),
                "bulk-add-0".to_string(),
            )),
            tokio::spawn(scheduler::run(ctx.clone())),
            tokio::spawn(reconciler::run(ctx)),
        ]
    }

    /// Signal every spawned task to stop pulling new work and drain.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        info!("Shutting down Pictura Core...");
        let _ = self.shutdown_tx.send(true);
        self.config.write().await.save()?;
        self.events.emit(Event::CoreShutdown);
        info!("Pictura Core shutdown complete");
        Ok(())
    }
}
