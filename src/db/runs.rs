//! Run lifecycle operations: the forward-only state machine over
//! `generation_runs`.
//!
//! Transitions are guarded UPDATEs (`WHERE status = ...`), so concurrent
//! writers cannot move a run backwards, and progress updates clamp with
//! GREATEST to stay monotonic. Each operation commits on its own; there is
//! deliberately no handler-spanning transaction.

use crate::error::{Error, Result};
use crate::model::{Run, RunId, RunPatch, RunStatus, RunStatusView};
use crate::store::{RunStore, StartOutcome};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use uuid::Uuid;

impl super::Db {
    async fn run_status_of(&self, id: RunId) -> Result<RunStatus> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM generation_runs WHERE id = $1")
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;
        match row {
            Some((status,)) => status.parse(),
            None => Err(Error::NotFound(format!("run {id}"))),
        }
    }

    fn record_transition(from: RunStatus, to: RunStatus) {
        metrics::run_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
    }
}

#[async_trait]
impl RunStore for super::Db {
    async fn create_run(&self, owner_id: Uuid, roadmap_id: Uuid) -> Result<RunId> {
        let id = RunId::new();
        sqlx::query(
            "INSERT INTO generation_runs (id, owner_id, roadmap_id, status, progress)
             VALUES ($1, $2, $3, 'queued', 0)",
        )
        .bind(id.0)
        .bind(owner_id)
        .bind(roadmap_id)
        .execute(self.pool())
        .await?;
        Ok(id)
    }

    async fn get_run(&self, id: RunId) -> Result<Run> {
        let row: Option<RunRow> = sqlx::query_as(
            "SELECT id, owner_id, roadmap_id, course_id, status, progress, message,
                    error, result, created_at, started_at, finished_at
             FROM generation_runs WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        row.ok_or_else(|| Error::NotFound(format!("run {id}")))?
            .try_into_run()
    }

    async fn start_run(&self, id: RunId) -> Result<StartOutcome> {
        let rows_affected = sqlx::query(
            "UPDATE generation_runs
             SET status = 'running',
                 progress = GREATEST(progress, 5),
                 started_at = COALESCE(started_at, now())
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 1 {
            Self::record_transition(RunStatus::Queued, RunStatus::Running);
            return Ok(StartOutcome::Started);
        }

        // Guard missed: the run is either already running, terminal, or gone.
        match self.run_status_of(id).await? {
            RunStatus::Running => Ok(StartOutcome::AlreadyRunning),
            status if status.is_terminal() => Ok(StartOutcome::Finished(status)),
            status => Err(Error::InvalidTransition {
                from: status,
                to: RunStatus::Running,
            }),
        }
    }

    async fn update_run(&self, id: RunId, patch: RunPatch) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE generation_runs
             SET progress = GREATEST(progress, COALESCE($2, progress)),
                 message = COALESCE($3, message),
                 error = COALESCE($4, error),
                 result = COALESCE($5, result)
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(patch.progress)
        .bind(patch.message)
        .bind(patch.error)
        .bind(patch.result)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("run {id}")));
        }
        Ok(())
    }

    async fn finish_run_ok(
        &self,
        id: RunId,
        result: serde_json::Value,
        message: Option<String>,
    ) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE generation_runs
             SET status = 'succeeded', progress = 100, result = $2,
                 message = COALESCE($3, message), finished_at = now()
             WHERE id = $1 AND status = 'running'",
        )
        .bind(id.0)
        .bind(result)
        .bind(message)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(Error::InvalidTransition {
                from: self.run_status_of(id).await?,
                to: RunStatus::Succeeded,
            });
        }
        Self::record_transition(RunStatus::Running, RunStatus::Succeeded);
        Ok(())
    }

    async fn finish_run_fail(&self, id: RunId, error: &str) -> Result<()> {
        // The self-join returns the pre-update status: a queued run can be
        // failed directly (malformed envelope before any start_run), and the
        // transition metric must carry the real `from`.
        let row: Option<(String,)> = sqlx::query_as(
            "UPDATE generation_runs AS run
             SET status = 'failed', error = $2, finished_at = now()
             FROM (SELECT id, status FROM generation_runs WHERE id = $1 FOR UPDATE) AS prior
             WHERE run.id = prior.id AND prior.status NOT IN ('succeeded', 'failed')
             RETURNING prior.status",
        )
        .bind(id.0)
        .bind(error)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some((prior,)) => {
                Self::record_transition(prior.parse()?, RunStatus::Failed);
                Ok(())
            }
            None => {
                // Already terminal is a no-op; a missing run is still an error.
                self.run_status_of(id).await?;
                Ok(())
            }
        }
    }

    async fn run_status(&self, id: RunId) -> Result<RunStatusView> {
        let run = self.get_run(id).await?;
        Ok(RunStatusView::from_run(&run))
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    owner_id: Uuid,
    roadmap_id: Uuid,
    course_id: Option<Uuid>,
    status: String,
    progress: i32,
    message: Option<String>,
    error: Option<String>,
    result: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RunRow {
    fn try_into_run(self) -> Result<Run> {
        Ok(Run {
            id: RunId(self.id),
            owner_id: self.owner_id,
            roadmap_id: self.roadmap_id,
            course_id: self.course_id,
            status: self.status.parse()?,
            progress: self.progress,
            message: self.message,
            error: self.error,
            result: self.result,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}
