//! Shared context threaded through the scheduler, reconciler and every
//! worker pool.

use crate::broker::Broker;
use crate::config::AppConfig;
use crate::infrastructure::database::Database;
use crate::infrastructure::events::EventBus;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Handles shared by every long-running task. Cheap to clone - everything
/// inside is an `Arc` - so it is passed by value instead of reached for
/// through global state.
#[derive(Clone)]
pub struct WorkerContext {
    pub db: Arc<Database>,
    pub broker: Arc<Broker>,
    pub config: Arc<RwLock<AppConfig>>,
    pub events: Arc<EventBus>,
    pub shutdown: watch::Receiver<bool>,
}

impl WorkerContext {
    pub fn new(
        db: Arc<Database>,
        broker: Arc<Broker>,
        config: Arc<RwLock<AppConfig>>,
        events: Arc<EventBus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            broker,
            config,
            events,
            shutdown,
        }
    }

    /// True once a shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// A real, file-backed `WorkerContext` for tests that exercise the
/// reconciler or scheduler end to end - these need a genuine `Database`
/// (not just a bare connection) since they go through `ctx.db.conn()`.
#[cfg(test)]
pub(crate) mod test_support {
    use super::WorkerContext;
    use crate::broker::Broker;
    use crate::config::AppConfig;
    use crate::infrastructure::database::Database;
    use crate::infrastructure::events::EventBus;
    use std::sync::Arc;
    use tokio::sync::{watch, RwLock};

    /// Returns the backing `TempDir` alongside the context so the SQLite
    /// file survives for the duration of the test.
    pub async fn test_context() -> (tempfile::TempDir, WorkerContext) {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let db_path = tmp.path().join("test.db");
        let db = Database::create(&db_path).await.expect("create db");
        db.migrate().await.expect("migrate db");
        let db = Arc::new(db);
        let broker = Arc::new(Broker::new(Arc::new(db.conn().clone())));
        let config = Arc::new(RwLock::new(AppConfig::default_with_dir(
            tmp.path().to_path_buf(),
        )));
        let events = Arc::new(EventBus::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = WorkerContext::new(db, broker, config, events, shutdown_rx);
        (tmp, ctx)
    }
}
