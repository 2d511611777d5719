//! Error types for courseforge.
//!
//! The taxonomy drives the worker's retry accounting: transport-class
//! failures are requeued up to [`MAX_RETRIES`](crate::queue::MAX_RETRIES),
//! while missing references and malformed messages fail the run immediately
//! with no requeue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The external generator was unreachable or timed out.
    #[error("generator transport error: {0}")]
    Transport(String),

    /// Generator output could not be parsed into a candidate.
    #[error("parse error: {0}")]
    Parse(String),

    /// A parsed candidate failed structural validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The validate-and-repair loop ran out of rounds. Terminal for the
    /// engine; the queue's attempt counter governs anything beyond.
    #[error("generation did not validate after repair: {0}")]
    Exhausted(String),

    /// A run, roadmap, course, or module referenced by a job does not exist.
    /// Non-retryable: the reference will not appear on redelivery.
    #[error("not found: {0}")]
    NotFound(String),

    /// A queued envelope that does not decode into a known job message.
    #[error("malformed job message: {0}")]
    MalformedJob(String),

    #[error("invalid run transition: {from} -> {to}")]
    InvalidTransition {
        from: crate::model::RunStatus,
        to: crate::model::RunStatus,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Should the worker requeue the job after this failure?
    ///
    /// Transient infrastructure failures and exhausted generation rounds
    /// count toward the queue-level attempt budget. Everything that will
    /// fail identically on redelivery does not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Exhausted(_) | Error::Storage(_) | Error::Other(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
