//! Worker pools: one per broker queue, each processing its own message
//! shape. A worker pool claims a batch, fans it out with bounded
//! concurrency, and acks or nacks each message individually so one bad
//! file in a batch doesn't block the rest.

pub mod bulk_ingester;
pub mod cache;
pub mod collection_scanner;
pub mod thumbnail;

use crate::broker::ClaimedMessage;
use crate::context::WorkerContext;
use futures::future::join_all;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Upper bound on a single message's handler, so a wedged decode or a
/// stuck filesystem call can't hold a claimed lease forever - the message
/// is nacked and becomes eligible for another worker to retry instead.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Drive a worker pool for a single queue until shutdown is signalled.
///
/// Waits for either the broker's per-queue wake-up or a fixed poll
/// interval (in case a notification was missed), claims a batch, and runs
/// `handle` over every claimed message with up to `concurrency` in
/// flight at once.
pub(crate) async fn run_queue_worker<F, Fut>(
    ctx: WorkerContext,
    queue: &'static str,
    worker_id: String,
    concurrency: usize,
    handle: F,
) where
    F: Fn(WorkerContext, ClaimedMessage) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), String>> + Send,
{
    let mut shutdown = ctx.shutdown.clone();
    let notifications = ctx.broker.subscribe(queue);

    loop {
        if ctx.is_shutting_down() {
            debug!(queue, "worker pool shutting down");
            return;
        }

        let (batch_size, lease_seconds, max_attempts) = {
            let config = ctx.config.read().await;
            (
                config.workers.claim_batch_size,
                config.workers.lease_seconds,
                config.workers.max_attempts,
            )
        };

        let claimed = match ctx
            .broker
            .claim(queue, batch_size as u64, lease_seconds, &worker_id)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                warn!(queue, error = %err, "failed to claim messages, backing off");
                sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if claimed.is_empty() {
            tokio::select! {
                _ = notifications.recv() => {}
                _ = sleep(Duration::from_millis(500)) => {}
                _ = shutdown.changed() => {}
            }
            continue;
        }

        let chunks = claimed.chunks(concurrency.max(1)).map(|c| c.to_vec());
        for chunk in chunks {
            let futures = chunk.into_iter().map(|message| {
                let ctx = ctx.clone();
                let handle = handle.clone();
                let id = message.id;
                async move {
                    let outcome = match timeout(MESSAGE_TIMEOUT, handle(ctx.clone(), message)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(format!(
                            "handler exceeded {}s timeout",
                            MESSAGE_TIMEOUT.as_secs()
                        )),
                    };
                    match outcome {
                        Ok(()) => {
                            let _ = ctx.broker.ack(id).await;
                        }
                        Err(error) => {
                            warn!(queue, message_id = %id, %error, "message processing failed");
                            let _ = ctx.broker.nack(id, &error, max_attempts).await;
                        }
                    }
                }
            });
            join_all(futures).await;
        }
    }
}
