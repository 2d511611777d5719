//! Job queue contract: a durable FIFO-ish message store with a pending list
//! and a processing list.
//!
//! A message is visible in pending OR in processing, never both, never
//! neither (once enqueued and not yet acknowledged). The atomic
//! pending → processing move in [`JobQueue::dequeue`] is the sole mutual
//! exclusion between workers: one message instance is handled by exactly one
//! worker at a time. Nothing here guards against two producers enqueueing
//! for the same run — that is a producer-side contract.
//!
//! Known limitation, inherited deliberately: a message can stay in
//! processing forever if the worker crashes between dequeue and
//! acknowledge/requeue. There is no visibility-timeout reaper; stuck entries
//! need manual intervention.

use crate::error::Result;
use crate::model::{JobPayload, JobType, RunId};
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Delivery attempts a message gets before it is dead-lettered. A message
/// failing its initial delivery plus `MAX_RETRIES` redeliveries marks the
/// run permanently failed.
pub const MAX_RETRIES: u32 = 3;

/// One message handed out by [`JobQueue::dequeue`]. The receipt identifies
/// the processing-list entry for acknowledge/requeue; the payload is the raw
/// JSON envelope (decoding it is the consumer's problem, so a malformed
/// envelope can still be acknowledged).
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: i64,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a new message (attempt=0) to the pending list. Never blocks;
    /// fails only if the underlying store is unavailable.
    async fn enqueue(&self, job_type: JobType, run_id: RunId, payload: JobPayload)
    -> Result<Uuid>;

    /// Atomically move one message from pending to processing and return it,
    /// or return None once `timeout` elapses with nothing pending. Suspends
    /// the caller while waiting; no busy-polling.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Delivery>>;

    /// Remove the message from processing. Call only after its work is
    /// durably complete or durably marked failed.
    async fn acknowledge(&self, delivery: &Delivery) -> Result<()>;

    /// Increment the message's attempt counter and move it back to pending.
    /// Returns the incremented attempt. Callers must dead-letter instead
    /// (fail the run, then [`acknowledge`](JobQueue::acknowledge)) when the
    /// incremented attempt would exceed [`MAX_RETRIES`].
    async fn requeue(&self, delivery: &Delivery) -> Result<u32>;
}
