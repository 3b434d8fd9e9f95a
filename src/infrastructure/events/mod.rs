//! Event bus for decoupled communication between the daemon's subsystems.

use tokio::sync::broadcast;
use uuid::Uuid;

/// Domain events broadcast to anything subscribed: the operator CLI's
/// `watch` command today, a future HTTP surface tomorrow.
#[derive(Debug, Clone)]
pub enum Event {
    /// The daemon finished start-up.
    CoreStarted,

    /// The daemon is shutting down.
    CoreShutdown,

    /// A library was registered.
    LibraryCreated { id: Uuid, name: String },

    /// A library's cron schedule fired and a collection scan was enqueued.
    LibraryScanScheduled {
        library_id: Uuid,
        collection_id: Uuid,
    },

    /// A collection scan's background job moved to a new stage.
    CollectionScanStageChanged {
        collection_id: Uuid,
        job_id: Uuid,
        stage: String,
    },

    /// A collection scan's background job reached a terminal state.
    CollectionScanCompleted {
        collection_id: Uuid,
        job_id: Uuid,
        succeeded: bool,
    },

    /// A background job's stage counters advanced.
    JobProgress {
        job_id: Uuid,
        stage: String,
        processed: u64,
        total: u64,
    },

    /// A background job reached a terminal state.
    JobCompleted { job_id: Uuid, succeeded: bool },

    /// A cache folder crossed its high watermark.
    CacheFolderNearCapacity {
        cache_folder_id: Uuid,
        used_bytes: u64,
        capacity_bytes: u64,
    },

    /// A new write was rebound away from a saturated cache folder.
    CacheFolderRebound { from: Uuid, to: Uuid },
}

/// Event bus for broadcasting events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event. Ignored if nobody is subscribed.
    pub fn emit(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(Event::CoreStarted);

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::CoreStarted));
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(Event::CoreShutdown);
    }
}
