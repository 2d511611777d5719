//! Postgres-backed job queue.
//!
//! The pending and processing lists are rows of the `jobs` table partitioned
//! by a `state` column. The atomic hand-off is a single UPDATE claiming the
//! oldest pending row with `FOR UPDATE SKIP LOCKED`, so concurrent workers
//! never claim the same message. Enqueue and requeue NOTIFY `jobs_ready`
//! transactionally; blocking dequeues LISTEN on that channel with a
//! poll-interval fallback instead of busy-polling.

use crate::error::Result;
use crate::model::{JobMessage, JobPayload, JobType, RunId};
use crate::queue::{Delivery, JobQueue};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Fallback wake-up interval when no NOTIFY arrives.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

const NOTIFY_CHANNEL: &str = "jobs_ready";

impl super::Db {
    /// Claim the oldest pending message, moving it to processing.
    async fn claim_one(&self) -> Result<Option<Delivery>> {
        let row: Option<(i64, serde_json::Value)> = sqlx::query_as(
            "UPDATE jobs SET state = 'processing'
             WHERE msg_id = (
                 SELECT msg_id FROM jobs
                 WHERE state = 'pending'
                 ORDER BY msg_id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING msg_id, payload",
        )
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(receipt, payload)| Delivery { receipt, payload }))
    }
}

#[async_trait]
impl JobQueue for super::Db {
    async fn enqueue(
        &self,
        job_type: JobType,
        run_id: RunId,
        payload: JobPayload,
    ) -> Result<Uuid> {
        let message = JobMessage::new(job_type, run_id, payload);
        let envelope = serde_json::to_value(&message)
            .map_err(|e| crate::error::Error::Other(format!("serialize job message: {e}")))?;

        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT INTO jobs (state, payload) VALUES ('pending', $1)")
            .bind(&envelope)
            .execute(&mut *tx)
            .await?;
        // NOTIFY is transactional — only fires on commit
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(job_type.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("operation", "enqueue"),
                KeyValue::new("job_type", job_type.to_string()),
            ],
        );
        Ok(message.task_id)
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(delivery) = self.claim_one().await? {
                metrics::queue_operations()
                    .add(1, &[KeyValue::new("operation", "claim")]);
                return Ok(Some(delivery));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                metrics::queue_operations()
                    .add(1, &[KeyValue::new("operation", "claim_empty")]);
                return Ok(None);
            }
            let wait = POLL_INTERVAL.min(deadline - now);

            // Park on LISTEN until a NOTIFY, the poll interval, or the
            // deadline — whichever comes first — then try claiming again.
            let mut guard = self.listener.lock().await;
            let listener = match guard.as_mut() {
                Some(l) => l,
                None => {
                    let mut l = PgListener::connect_with(self.pool()).await?;
                    l.listen(NOTIFY_CHANNEL).await?;
                    guard.insert(l)
                }
            };
            if let Ok(Err(e)) = tokio::time::timeout(wait, listener.recv()).await {
                warn!("queue listener error: {e}, reconnecting on next wait");
                *guard = None;
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE msg_id = $1 AND state = 'processing'")
            .bind(delivery.receipt)
            .execute(self.pool())
            .await?;
        metrics::queue_operations().add(1, &[KeyValue::new("operation", "acknowledge")]);
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<u32> {
        let mut tx = self.pool().begin().await?;
        let row: (i32,) = sqlx::query_as(
            "UPDATE jobs
             SET state = 'pending',
                 payload = jsonb_set(
                     payload, '{attempt}',
                     to_jsonb(COALESCE((payload->>'attempt')::int, 0) + 1)
                 ),
                 enqueued_at = now()
             WHERE msg_id = $1 AND state = 'processing'
             RETURNING (payload->>'attempt')::int",
        )
        .bind(delivery.receipt)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("SELECT pg_notify($1, 'requeue')")
            .bind(NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        metrics::queue_operations().add(1, &[KeyValue::new("operation", "requeue")]);
        Ok(row.0 as u32)
    }
}
