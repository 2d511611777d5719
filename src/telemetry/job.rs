//! Job execution span helpers.

use crate::model::{JobType, RunId};
use tracing::Span;

/// Start a span wrapping one job delivery, from decode through settle.
pub fn start_job_span(job_type: JobType, run_id: RunId) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.type" = %job_type,
        "job.run_id" = %run_id.0,
    )
}
