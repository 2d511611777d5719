//! Core data model.
//!
//! A generation run tracks one background attempt's lifecycle; a job message
//! is the queued unit of work referencing it. Roadmaps are the read-only
//! source specs, courses and their modules the produced artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Newtype for generation run IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Job messages
// ---------------------------------------------------------------------------

/// What kind of generation a job performs. Closed set: dispatch is an
/// exhaustive match, so adding a job type is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Plan the week-by-week outline and create the course skeleton.
    Outline,
    /// Fill the course's modules with long-form content.
    Content,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobType::Outline => "outline",
            JobType::Content => "content",
        };
        write!(f, "{s}")
    }
}

/// The wire envelope persisted in the queue, serialized as JSON.
///
/// Immutable except `attempt`, which the queue increments each time the
/// message is returned to pending after a handling failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub task_id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub run_id: RunId,
    pub course_id: Option<Uuid>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(job_type: JobType, run_id: RunId, payload: JobPayload) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            job_type,
            run_id,
            course_id: payload.course_id,
            overwrite: payload.overwrite,
            attempt: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Producer-supplied job parameters beyond the run reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobPayload {
    pub course_id: Option<Uuid>,
    pub overwrite: bool,
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Record created, job enqueued, no worker has picked it up.
    Queued,
    /// A worker is (or was) handling it.
    Running,
    /// Finished with a result. Terminal.
    Succeeded,
    /// Finished with an error. Terminal.
    Failed,
}

impl RunStatus {
    /// Is this a terminal status? Nothing leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(crate::error::Error::Other(format!(
                "unknown run status: {other}"
            ))),
        }
    }
}

/// Persisted record of one generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub owner_id: Uuid,
    pub roadmap_id: Uuid,
    /// The produced course, once the outline handler has created it.
    pub course_id: Option<Uuid>,
    pub status: RunStatus,
    /// 0..=100, monotonically non-decreasing while running.
    pub progress: i32,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Opaque result payload, written on success.
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Partial update for a run. Only non-absent fields are applied, so progress
/// writes are idempotent and order-independent for disjoint fields.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub progress: Option<i32>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl RunPatch {
    pub fn progress(progress: i32) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn checkpoint(progress: i32, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Read-only projection of a run for status polling. The result payload is
/// only exposed once the run has succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusView {
    pub id: RunId,
    pub status: RunStatus,
    pub progress: i32,
    pub message: Option<String>,
    pub error: Option<String>,
    pub course_id: Option<Uuid>,
    pub result: Option<serde_json::Value>,
}

impl RunStatusView {
    pub fn from_run(run: &Run) -> Self {
        Self {
            id: run.id,
            status: run.status,
            progress: run.progress,
            message: run.message.clone(),
            error: run.error.clone(),
            course_id: run.course_id,
            result: match run.status {
                RunStatus::Succeeded => run.result.clone(),
                _ => None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Source spec and artifacts
// ---------------------------------------------------------------------------

/// The learner-submitted spec a generation run works from. Created by the
/// request-handling layer; read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Roadmap {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Subject area, e.g. "applied statistics".
    pub field: String,
    /// Learner level, e.g. "beginner".
    pub level: String,
    pub weekly_hours: i32,
    pub duration_weeks: i32,
}

/// Artifact container created by the outline handler, filled by the content
/// handler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub roadmap_id: Uuid,
    /// "draft" until a handler finishes with it, then "ready".
    pub status: String,
    pub title: String,
    pub description: Option<String>,
}

/// One week's content unit. Title and outcomes come from the outline;
/// `content_md` stays None until the content handler writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: Uuid,
    pub course_id: Uuid,
    pub week: i32,
    pub title: String,
    pub outcomes: Vec<String>,
    pub content_md: Option<String>,
}

impl CourseModule {
    /// Does this module already carry non-empty content?
    pub fn has_content(&self) -> bool {
        self.content_md
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}
