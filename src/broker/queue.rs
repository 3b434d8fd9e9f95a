//! SQL-backed durable queue.
//!
//! Claiming is a claim-and-lease: a batch of `ready` rows due by now is
//! selected, then flipped to `leased` with an owner tag and a visibility
//! deadline in one transaction. A worker that dies mid-processing simply
//! lets its lease expire; [`Broker::reap_expired_leases`] returns those
//! rows to `ready` for someone else to pick up. This mirrors the
//! claim/lease batch pattern SQL-backed job queues use instead of a
//! destructive dequeue, which would lose in-flight work on a crash.
//!
//! Idle workers are woken through an [`async_channel`] per queue instead of
//! busy-polling; a missed notification is harmless since the claim loop
//! also runs on a timer.

use super::error::{BrokerError, BrokerResult};
use super::message::{ClaimedMessage, QueuePayload};
use crate::store::entities::queue_message::{self, Entity as QueueMessage};
use async_channel::Receiver;
use chrono::{Duration, Utc};
use queue_notifiers::QueueNotifiers;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// Durable, SQLite-backed message broker shared by every worker pool.
pub struct Broker {
    db: Arc<DatabaseConnection>,
    notifiers: QueueNotifiers,
}

impl Broker {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            notifiers: QueueNotifiers::default(),
        }
    }

    /// Subscribe to wake-ups for a queue. Returns immediately with a
    /// receiver; the channel stays open for the broker's lifetime.
    pub fn subscribe(&self, queue: &str) -> Receiver<()> {
        self.notifiers.receiver(queue)
    }

    /// Durably enqueue a message, waking one subscriber of its queue.
    pub async fn enqueue(&self, payload: QueuePayload) -> BrokerResult<Uuid> {
        let queue = payload.queue_name();
        let id = Uuid::new_v4();
        let now = Utc::now();

        let model = queue_message::ActiveModel {
            id: Set(id),
            queue: Set(queue.to_string()),
            payload: Set(rmp_serde::to_vec(&payload)?),
            status: Set("ready".to_string()),
            available_at: Set(now.into()),
            attempts: Set(0),
            locked_by: Set(None),
            locked_until: Set(None),
            created_at: Set(now.into()),
        };
        model.insert(self.db.as_ref()).await?;

        self.notifiers.notify(queue);
        Ok(id)
    }

    /// Claim up to `batch_size` ready messages on `queue`, leasing them to
    /// `worker_id` for `lease_seconds`.
    pub async fn claim(
        &self,
        queue: &str,
        batch_size: u64,
        lease_seconds: i64,
        worker_id: &str,
    ) -> BrokerResult<Vec<ClaimedMessage>> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let candidates = QueueMessage::find()
            .filter(
                Condition::all()
                    .add(queue_message::Column::Queue.eq(queue))
                    .add(queue_message::Column::Status.eq("ready"))
                    .add(queue_message::Column::AvailableAt.lte(now)),
            )
            .order_by_asc(queue_message::Column::AvailableAt)
            .limit(batch_size)
            .all(&txn)
            .await?;

        if candidates.is_empty() {
            txn.commit().await?;
            return Ok(vec![]);
        }

        let locked_until = now + Duration::seconds(lease_seconds);
        let mut claimed = Vec::with_capacity(candidates.len());

        for row in candidates {
            let attempts = row.attempts + 1;
            let payload: QueuePayload = rmp_serde::from_slice(&row.payload)?;
            let mut model: queue_message::ActiveModel = row.clone().into();
            model.status = Set("leased".to_string());
            model.locked_by = Set(Some(worker_id.to_string()));
            model.locked_until = Set(Some(locked_until.into()));
            model.attempts = Set(attempts);
            model.update(&txn).await?;

            claimed.push(ClaimedMessage {
                id: row.id,
                queue: row.queue,
                payload,
                attempts,
            });
        }

        txn.commit().await?;
        Ok(claimed)
    }

    /// Acknowledge successful processing, removing the message.
    pub async fn ack(&self, id: Uuid) -> BrokerResult<()> {
        QueueMessage::delete_by_id(id).exec(self.db.as_ref()).await?;
        Ok(())
    }

    /// Report a processing failure. Below `max_attempts` the message goes
    /// back to `ready` after a linear backoff; at or above it, the message
    /// is moved to the dead-letter table.
    pub async fn nack(
        &self,
        id: Uuid,
        error: &str,
        max_attempts: u32,
    ) -> BrokerResult<()> {
        let txn = self.db.begin().await?;

        let Some(row) = QueueMessage::find_by_id(id).one(&txn).await? else {
            txn.commit().await?;
            return Err(BrokerError::NotFound(id));
        };

        if row.attempts as u32 >= max_attempts {
            let dead = crate::store::entities::dead_letter_message::ActiveModel {
                id: Set(Uuid::new_v4()),
                queue: Set(row.queue.clone()),
                payload: Set(row.payload.clone()),
                error: Set(error.to_string()),
                attempts: Set(row.attempts),
                failed_at: Set(Utc::now().into()),
            };
            dead.insert(&txn).await?;
            QueueMessage::delete_by_id(id).exec(&txn).await?;
        } else {
            let backoff = Duration::seconds(5 * row.attempts as i64);
            let mut model: queue_message::ActiveModel = row.into();
            model.status = Set("ready".to_string());
            model.locked_by = Set(None);
            model.locked_until = Set(None);
            model.available_at = Set((Utc::now() + backoff).into());
            model.update(&txn).await?;
        }

        txn.commit().await?;
        self.notifiers.notify(&self.queue_name_of(id).await.unwrap_or_default());
        Ok(())
    }

    /// Return leases that have expired back to `ready` so another worker
    /// can pick them up. Called periodically by the reconciler.
    pub async fn reap_expired_leases(&self) -> BrokerResult<u64> {
        let now = Utc::now();
        let expired = QueueMessage::find()
            .filter(queue_message::Column::Status.eq("leased"))
            .filter(queue_message::Column::LockedUntil.lte(now))
            .all(self.db.as_ref())
            .await?;

        let count = expired.len() as u64;
        for row in expired {
            let queue = row.queue.clone();
            let mut model: queue_message::ActiveModel = row.into();
            model.status = Set("ready".to_string());
            model.locked_by = Set(None);
            model.locked_until = Set(None);
            model.update(self.db.as_ref()).await?;
            self.notifiers.notify(&queue);
        }

        Ok(count)
    }

    async fn queue_name_of(&self, id: Uuid) -> BrokerResult<Option<String>> {
        Ok(QueueMessage::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(|m| m.queue))
    }
}

/// Minimal registry of per-queue notification channels. Not a general
/// concurrent map - queue names are a small, fixed set known at startup -
/// so a `Mutex<HashMap<..>>` is all this needs.
mod queue_notifiers {
    use async_channel::{bounded, Receiver, Sender};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct QueueNotifiers {
        inner: Mutex<HashMap<String, (Sender<()>, Receiver<()>)>>,
    }

    impl QueueNotifiers {
        /// `async_channel` receivers are MPMC and cloneable, so every caller
        /// gets a handle to the same underlying channel for this queue.
        pub fn receiver(&self, queue: &str) -> Receiver<()> {
            let mut guard = self.inner.lock().unwrap();
            guard
                .entry(queue.to_string())
                .or_insert_with(|| bounded(1))
                .1
                .clone()
        }

        pub fn notify(&self, queue: &str) {
            let guard = self.inner.lock().unwrap();
            if let Some((sender, _)) = guard.get(queue) {
                let _ = sender.try_send(());
            }
        }
    }
}
