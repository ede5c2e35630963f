//! Failure capture for jobs and dirmon entries.
//!
//! [`JobError`] is the error type returned by user-supplied handlers.
//! [`JobException`] is the embedded record persisted on the failed document,
//! carrying enough context to inspect the failure after the fact.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::WorkerName;

/// An error raised by a job's perform method or one of its hooks.
///
/// `class_name` is a free-form classification chosen by the handler author
/// (for example `"RuntimeError"` or `"Net::Timeout"`); it is persisted
/// verbatim in the exception record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{class_name}: {message}")]
pub struct JobError {
    pub class_name: String,
    pub message: String,
}

impl JobError {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        JobError {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        JobError::new("IOError", e.to_string())
    }
}

/// Embedded record persisted on a failed job or dirmon entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobException {
    /// Classification of the error, as reported by the handler.
    pub class_name: String,

    /// Human-readable failure message.
    pub message: String,

    /// Call stack captured at the moment the failure was recorded.
    pub backtrace: Vec<String>,

    /// Name of the worker that owned the claim when the failure happened.
    pub worker_name: String,
}

impl JobException {
    /// Captures an exception record for a handler error.
    ///
    /// The backtrace is captured here, at record time, not where the handler
    /// returned its error. Capture honors the standard `RUST_BACKTRACE`
    /// environment controls; with backtraces disabled the trace is empty.
    pub fn capture(error: &JobError, worker_name: &WorkerName) -> Self {
        let backtrace = std::backtrace::Backtrace::capture()
            .to_string()
            .lines()
            .map(str::to_string)
            .collect();
        JobException {
            class_name: error.class_name.clone(),
            message: error.message.clone(),
            backtrace,
            worker_name: worker_name.as_str().to_string(),
        }
    }

    /// Captures an exception record from a bare message (dirmon policy
    /// failures have no handler error to wrap).
    pub fn from_message(
        class_name: impl Into<String>,
        message: impl Into<String>,
        worker_name: &WorkerName,
    ) -> Self {
        JobException {
            class_name: class_name.into(),
            message: message.into(),
            backtrace: Vec::new(),
            worker_name: worker_name.as_str().to_string(),
        }
    }
}
