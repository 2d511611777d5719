//! Worker loop: dequeue → dispatch by job type → acknowledge or requeue.
//!
//! One message at a time per loop iteration; any number of worker processes
//! may share the queue and store, with the queue's atomic claim as the only
//! mutual exclusion. All domain errors end up in the run record; only
//! queue/store connectivity failures reach the loop's outer boundary, where
//! they are logged and the loop continues after the next dequeue timeout.

pub mod handlers;

use crate::error::{Error, Result};
use crate::llm::TextGenerator;
use crate::model::{JobMessage, JobType, RunId, RunPatch};
use crate::queue::{Delivery, JobQueue, MAX_RETRIES};
use crate::store::{CourseStore, RunStore};
use crate::telemetry::job::start_job_span;
use crate::telemetry::metrics;
use handlers::JobOutcome;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

/// Configuration for a worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound for one blocking dequeue; the loop re-checks shutdown at
    /// this cadence when the queue is idle.
    pub dequeue_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout: Duration::from_secs(30),
        }
    }
}

/// Long-running consumer over one queue, one store, one generator — all
/// explicitly constructed and passed in at startup.
pub struct Worker<Q, S, G> {
    queue: Arc<Q>,
    store: Arc<S>,
    generator: Arc<G>,
    config: WorkerConfig,
    shutdown: Arc<Notify>,
}

impl<Q, S, G> Clone for Worker<Q, S, G> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl<Q, S, G> Worker<Q, S, G>
where
    Q: JobQueue,
    S: RunStore + CourseStore,
    G: TextGenerator,
{
    pub fn new(queue: Arc<Q>, store: Arc<S>, generator: Arc<G>, config: WorkerConfig) -> Self {
        Self {
            queue,
            store,
            generator,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the worker to stop after the current iteration.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!("worker started, waiting for jobs");
        loop {
            // A dequeue is not cancellation-safe: its pending → processing
            // claim may have committed before the future is dropped, which
            // would strand the message in processing. On shutdown, let the
            // in-flight dequeue finish (it is bounded by the timeout) and
            // settle whatever it claimed before exiting.
            let dequeue = self.queue.dequeue(self.config.dequeue_timeout);
            tokio::pin!(dequeue);

            let dequeued = tokio::select! {
                _ = self.shutdown.notified() => None,
                dequeued = &mut dequeue => Some(dequeued),
            };

            let dequeued = match dequeued {
                Some(dequeued) => dequeued,
                None => {
                    info!("worker shutting down");
                    match dequeue.await {
                        Ok(Some(delivery)) => {
                            if let Err(e) = self.handle_delivery(delivery).await {
                                error!("error settling delivery: {e}");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => error!("dequeue error during shutdown: {e}"),
                    }
                    return Ok(());
                }
            };

            match dequeued {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.handle_delivery(delivery).await {
                        error!("error settling delivery: {e}");
                    }
                }
                Ok(None) => debug!("idle (no jobs)"),
                Err(e) => error!("dequeue error: {e}"),
            }
        }
    }

    /// Dequeue and handle at most one message. Returns whether a message was
    /// handled. Exposed for tests and drain-style tooling.
    pub async fn process_one(&self) -> Result<bool> {
        match self.queue.dequeue(self.config.dequeue_timeout).await? {
            Some(delivery) => {
                self.handle_delivery(delivery).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Decode, dispatch, and settle one delivery. The returned error is the
    /// outer boundary: it carries only queue/store failures hit while
    /// settling, never domain errors.
    async fn handle_delivery(&self, delivery: Delivery) -> Result<()> {
        let message: JobMessage = match serde_json::from_value(delivery.payload.clone()) {
            Ok(message) => message,
            Err(e) => return self.reject_malformed(&delivery, &e.to_string()).await,
        };

        let span = start_job_span(message.job_type, message.run_id);
        async {
            info!(
                task = %message.task_id,
                attempt = message.attempt,
                overwrite = message.overwrite,
                "job picked up"
            );

            let started = Instant::now();
            let outcome = self.dispatch(&message).await;
            metrics::operation_duration_ms().record(
                started.elapsed().as_millis() as f64,
                &[KeyValue::new(
                    "operation",
                    format!("job.{}", message.job_type),
                )],
            );

            match outcome {
                Ok(JobOutcome::Skipped { status }) => {
                    info!(%status, "run already settled, skipping redelivery");
                    self.queue.acknowledge(&delivery).await
                }
                Ok(outcome) => {
                    info!(?outcome, "job completed");
                    self.queue.acknowledge(&delivery).await
                }
                Err(e) if e.is_retryable() => {
                    self.retry_or_dead_letter(&delivery, &message, &e).await
                }
                Err(e) => {
                    warn!(error = %e, "job failed, not retryable");
                    self.mark_failed(message.run_id, &e.to_string()).await;
                    self.queue.acknowledge(&delivery).await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, message: &JobMessage) -> Result<JobOutcome> {
        match message.job_type {
            JobType::Outline => {
                handlers::handle_outline(
                    self.store.as_ref(),
                    self.generator.as_ref(),
                    message.run_id,
                )
                .await
            }
            JobType::Content => {
                let course_id = message.course_id.ok_or_else(|| {
                    Error::MalformedJob("content job without course_id".to_string())
                })?;
                handlers::handle_content(
                    self.store.as_ref(),
                    self.generator.as_ref(),
                    message.run_id,
                    course_id,
                    message.overwrite,
                )
                .await
            }
        }
    }

    /// Queue-level retry accounting for transient failures: requeue with an
    /// incremented attempt, or dead-letter once the budget is spent.
    async fn retry_or_dead_letter(
        &self,
        delivery: &Delivery,
        message: &JobMessage,
        cause: &Error,
    ) -> Result<()> {
        let next_attempt = message.attempt + 1;
        if next_attempt > MAX_RETRIES {
            error!(attempts = next_attempt, error = %cause, "retries exhausted, dead-lettering");
            self.mark_failed(message.run_id, &format!("retries exhausted: {cause}"))
                .await;
            self.queue.acknowledge(delivery).await
        } else {
            warn!(
                retry = next_attempt,
                max = MAX_RETRIES,
                error = %cause,
                "transient failure, requeueing"
            );
            // Best-effort retry note; the run stays running so the
            // redelivery can resume it.
            if let Err(e) = self
                .store
                .update_run(
                    message.run_id,
                    RunPatch::message(format!(
                        "Retry {next_attempt}/{MAX_RETRIES} after error: {cause}"
                    )),
                )
                .await
            {
                warn!("could not record retry note: {e}");
            }
            self.queue.requeue(delivery).await?;
            Ok(())
        }
    }

    /// An envelope that does not decode (unknown job type, missing fields):
    /// fail the referenced run if one can be salvaged, acknowledge, never
    /// requeue.
    async fn reject_malformed(&self, delivery: &Delivery, detail: &str) -> Result<()> {
        error!(receipt = delivery.receipt, "malformed job message: {detail}");
        let run_id = delivery
            .payload
            .get("run_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(RunId);
        if let Some(run_id) = run_id {
            self.mark_failed(run_id, &format!("malformed job message: {detail}"))
                .await;
        }
        self.queue.acknowledge(delivery).await
    }

    /// Best-effort terminal failure write; a run that cannot be marked (for
    /// example because it never existed) is logged, not propagated, so the
    /// delivery still gets acknowledged.
    async fn mark_failed(&self, run_id: RunId, error: &str) {
        if let Err(e) = self.store.finish_run_fail(run_id, error).await {
            warn!(run = %run_id, "could not record failure: {e}");
        }
    }
}
