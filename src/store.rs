//! Persistence contracts for runs and course artifacts.
//!
//! Split in two: [`RunStore`] is the lifecycle state machine for generation
//! runs, [`CourseStore`] holds the source specs and produced artifacts. The
//! Postgres [`Db`](crate::db::Db) implements both; tests run the worker
//! against in-memory implementations.
//!
//! Every operation commits individually — there are no transactions spanning
//! a whole handler invocation. A crash mid-handler leaves the run at its
//! last committed checkpoint, which is what preserves partial
//! content-generation progress.

use crate::error::Result;
use crate::model::{
    Course, CourseModule, Roadmap, Run, RunId, RunPatch, RunStatus, RunStatusView,
};
use crate::generate::outline::Outline;
use async_trait::async_trait;
use uuid::Uuid;

/// What [`RunStore::start_run`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The run was queued; it is now running with progress 5 and a
    /// started_at timestamp.
    Started,
    /// The run was already running. No fields were touched; handling
    /// proceeds as a resumption (this is the redelivery-after-retry path).
    AlreadyRunning,
    /// The run is terminal. Redelivered work must be skipped, not redone.
    Finished(RunStatus),
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a queued run for `roadmap_id`, owned by `owner_id`. Producers
    /// call this before enqueueing the job that references it.
    async fn create_run(&self, owner_id: Uuid, roadmap_id: Uuid) -> Result<RunId>;

    async fn get_run(&self, id: RunId) -> Result<Run>;

    /// Move a queued run to running (progress 5, started_at set). Terminal
    /// and already-running runs are left untouched; see [`StartOutcome`].
    async fn start_run(&self, id: RunId) -> Result<StartOutcome>;

    /// Apply a partial update, committed immediately so progress survives a
    /// crash of the handler that issued it. Progress never decreases.
    async fn update_run(&self, id: RunId, patch: RunPatch) -> Result<()>;

    /// Terminal success: status succeeded, progress 100, finished_at set.
    async fn finish_run_ok(
        &self,
        id: RunId,
        result: serde_json::Value,
        message: Option<String>,
    ) -> Result<()>;

    /// Terminal failure: status failed, error recorded, finished_at set.
    /// Progress is left as-is. No-op if the run is already terminal.
    async fn finish_run_fail(&self, id: RunId, error: &str) -> Result<()>;

    /// Read-only projection for status polling.
    async fn run_status(&self, id: RunId) -> Result<RunStatusView>;
}

/// Everything a new roadmap needs; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewRoadmap {
    pub owner_id: Uuid,
    pub title: String,
    pub field: String,
    pub level: String,
    pub weekly_hours: i32,
    pub duration_weeks: i32,
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn create_roadmap(&self, new: NewRoadmap) -> Result<Uuid>;

    async fn get_roadmap(&self, id: Uuid) -> Result<Roadmap>;

    /// Create the course container plus one module per outline week (content
    /// unset) and link it to the run, all in one transaction. Returns the
    /// course id.
    async fn create_course(&self, run: &Run, roadmap: &Roadmap, outline: &Outline)
    -> Result<Uuid>;

    async fn get_course(&self, id: Uuid) -> Result<Course>;

    /// Modules of a course, ordered by week ascending.
    async fn list_modules(&self, course_id: Uuid) -> Result<Vec<CourseModule>>;

    /// Write a module's content, committed immediately.
    async fn write_module_content(&self, module_id: Uuid, content: &str) -> Result<()>;

    async fn set_course_ready(&self, course_id: Uuid) -> Result<()>;
}
