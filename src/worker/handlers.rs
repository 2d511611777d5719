//! Job handlers: the two concrete workflows built on the validation-repair
//! engine and the run store.
//!
//! Handlers own the run from `start_run` onward and write every progress
//! checkpoint themselves. They do not write failure state for retryable
//! errors — those propagate to the worker loop, which runs the queue-level
//! retry accounting and decides between requeue and dead-letter.

use crate::error::{Error, Result};
use crate::generate::{module::write_module_content, outline::plan_outline};
use crate::llm::TextGenerator;
use crate::model::{RunId, RunPatch, RunStatus};
use crate::store::{CourseStore, RunStore, StartOutcome};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// What a handler did with its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The run was already terminal; redelivered work was not redone.
    Skipped { status: RunStatus },
    /// Outline generated, course skeleton created and linked.
    OutlineCreated { course_id: Uuid },
    /// Content pass finished over all modules.
    ContentWritten { written: usize, skipped: usize },
}

/// Generate the outline for a run's roadmap and create the course skeleton.
///
/// Progress checkpoints: 5 (start) → 20 (before generation) → 60 (after
/// generation) → 85 (structure persisted) → 100 (done).
pub async fn handle_outline<S, G>(store: &S, generator: &G, run_id: RunId) -> Result<JobOutcome>
where
    S: RunStore + CourseStore + ?Sized,
    G: TextGenerator + ?Sized,
{
    match store.start_run(run_id).await? {
        StartOutcome::Finished(status) => return Ok(JobOutcome::Skipped { status }),
        StartOutcome::Started | StartOutcome::AlreadyRunning => {}
    }

    let run = store.get_run(run_id).await?;
    let roadmap = store.get_roadmap(run.roadmap_id).await?;

    store
        .update_run(run_id, RunPatch::checkpoint(20, "Planning roadmap outline"))
        .await?;
    let outline = plan_outline(generator, &roadmap).await?;

    store
        .update_run(run_id, RunPatch::checkpoint(60, "Creating course structure"))
        .await?;
    let course_id = store.create_course(&run, &roadmap, &outline).await?;
    info!(run = %run_id, course = %course_id, weeks = outline.weeks.len(), "course skeleton created");

    let result = serde_json::to_value(&outline)
        .map_err(|e| Error::Other(format!("serialize outline: {e}")))?;
    store
        .update_run(
            run_id,
            RunPatch {
                progress: Some(85),
                message: Some("Saving outline and course structure".to_string()),
                result: Some(result.clone()),
                ..Default::default()
            },
        )
        .await?;

    store.set_course_ready(course_id).await?;
    store
        .finish_run_ok(run_id, result, Some("Done".to_string()))
        .await?;
    Ok(JobOutcome::OutlineCreated { course_id })
}

/// Fill a course's modules with long-form content, one module at a time.
///
/// Modules that already carry content are skipped unless `overwrite`; each
/// written module is committed immediately so a crash before the last one
/// keeps the progress made. Run progress tracks (written + skipped) / total.
pub async fn handle_content<S, G>(
    store: &S,
    generator: &G,
    run_id: RunId,
    course_id: Uuid,
    overwrite: bool,
) -> Result<JobOutcome>
where
    S: RunStore + CourseStore + ?Sized,
    G: TextGenerator + ?Sized,
{
    match store.start_run(run_id).await? {
        StartOutcome::Finished(status) => return Ok(JobOutcome::Skipped { status }),
        StartOutcome::Started | StartOutcome::AlreadyRunning => {}
    }

    let course = store.get_course(course_id).await?;
    let modules = store.list_modules(course_id).await?;
    if modules.is_empty() {
        return Err(Error::NotFound(format!("no modules for course {course_id}")));
    }
    let roadmap = store.get_roadmap(course.roadmap_id).await?;

    store
        .update_run(run_id, RunPatch::checkpoint(5, "Generating module content"))
        .await?;

    let total = modules.len();
    let mut written = 0usize;
    let mut skipped = 0usize;

    for module in &modules {
        if module.has_content() && !overwrite {
            skipped += 1;
            continue;
        }

        let done = written + skipped;
        let progress = 5 + (done * 90 / total) as i32;
        store
            .update_run(
                run_id,
                RunPatch::checkpoint(
                    progress,
                    format!("Writing week {}/{}: {}", module.week, total, module.title),
                ),
            )
            .await?;

        let content = write_module_content(generator, &roadmap, module).await?;
        store.write_module_content(module.id, &content).await?;
        written += 1;
    }

    store.set_course_ready(course_id).await?;
    store
        .finish_run_ok(
            run_id,
            json!({"written": written, "skipped": skipped, "overwrite": overwrite}),
            Some(format!(
                "Course content ready (written={written}, skipped={skipped}, overwrite={overwrite})"
            )),
        )
        .await?;
    Ok(JobOutcome::ContentWritten { written, skipped })
}
