//! Durable, SQL-backed message broker connecting the scheduler and workers
//! to the four processing queues.

pub mod error;
pub mod message;
pub mod queue;

pub use error::{BrokerError, BrokerResult};
pub use message::{ClaimedMessage, QueuePayload};
pub use queue::Broker;
