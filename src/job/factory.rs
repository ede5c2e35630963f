//! Building, enqueueing, and inline-running jobs.
//!
//! The factory is the only construction path for jobs:
//!
//! - [`build`] constructs in memory (defaults hook, then the caller's
//!   configuration closure) without persisting.
//! - [`later`] persists a queued job for the dispatcher, unless the engine
//!   is in inline mode, in which case it delegates to [`now`].
//! - [`now`] runs the job synchronously on a fabricated worker named
//!   `"inline"`.
//!
//! The `perform_*` variants are sugar for `method = "perform"`.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::engine::Engine;
use crate::error::InvalidTransition;
use crate::store::StoreError;
use crate::worker::{WorkError, Worker, work};

use super::job::{JOBS_COLLECTION, Job};

/// Errors from factory operations.
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The class name was never registered.
    #[error("unknown job class: {0}")]
    UnknownJobClass(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    /// Inline execution failed (only surfaced in inline mode, where user
    /// errors re-raise).
    #[error(transparent)]
    Work(#[from] WorkError),
}

/// Result type for factory operations.
pub type Result<T> = std::result::Result<T, FactoryError>;

/// Constructs a job in memory without persisting it.
pub fn build(
    engine: &Engine,
    job_class_name: &str,
    method: &str,
    arguments: Vec<Value>,
) -> Result<Job> {
    build_with(engine, job_class_name, method, arguments, |_| {})
}

/// Constructs a job in memory, applying the type's defaults hook and then
/// the caller's configuration closure.
pub fn build_with(
    engine: &Engine,
    job_class_name: &str,
    method: &str,
    arguments: Vec<Value>,
    configure: impl FnOnce(&mut Job),
) -> Result<Job> {
    let job_type = engine
        .registry()
        .get(job_class_name)
        .ok_or_else(|| FactoryError::UnknownJobClass(job_class_name.to_string()))?;

    let mut job = Job::new(job_class_name);
    job.perform_method = method.to_string();
    job.arguments = arguments;

    if let Some(defaults) = job_type.defaults() {
        defaults(&mut job);
    }
    configure(&mut job);
    Ok(job)
}

/// Enqueues a job for the dispatcher; in inline mode, runs it synchronously
/// instead.
pub fn later(
    engine: &Engine,
    job_class_name: &str,
    method: &str,
    arguments: Vec<Value>,
) -> Result<Job> {
    later_with(engine, job_class_name, method, arguments, |_| {})
}

/// [`later`] with a configuration closure.
pub fn later_with(
    engine: &Engine,
    job_class_name: &str,
    method: &str,
    arguments: Vec<Value>,
    configure: impl FnOnce(&mut Job),
) -> Result<Job> {
    if engine.inline_mode() {
        return now_with(engine, job_class_name, method, arguments, configure);
    }

    let job = build_with(engine, job_class_name, method, arguments, configure)?;
    engine.store().insert(JOBS_COLLECTION, job.to_document()?)?;
    debug!(
        job_id = %job.id,
        job_class = %job.job_class_name,
        priority = job.priority,
        "job enqueued"
    );
    Ok(job)
}

/// Builds and runs a job synchronously, returning it in its terminal state.
///
/// Fabricates a started worker named `"inline"`, starts the job, then loops
/// `work` while the job remains running and `work` keeps returning `false`.
/// Nothing is persisted unless the job was enqueued beforehand.
pub fn now(
    engine: &Engine,
    job_class_name: &str,
    method: &str,
    arguments: Vec<Value>,
) -> Result<Job> {
    now_with(engine, job_class_name, method, arguments, |_| {})
}

/// [`now`] with a configuration closure.
pub fn now_with(
    engine: &Engine,
    job_class_name: &str,
    method: &str,
    arguments: Vec<Value>,
    configure: impl FnOnce(&mut Job),
) -> Result<Job> {
    let mut job = build_with(engine, job_class_name, method, arguments, configure)?;
    let mut worker = Worker::new("inline");
    worker.start();

    job.start()?;
    loop {
        let exclude = work(engine, &mut job, &worker)?;
        if exclude || !job.running() {
            break;
        }
    }
    Ok(job)
}

// ─── Sugar for the default perform method ───

pub fn perform_build(engine: &Engine, job_class_name: &str, arguments: Vec<Value>) -> Result<Job> {
    build(engine, job_class_name, "perform", arguments)
}

pub fn perform_later(engine: &Engine, job_class_name: &str, arguments: Vec<Value>) -> Result<Job> {
    later(engine, job_class_name, "perform", arguments)
}

pub fn perform_now(engine: &Engine, job_class_name: &str, arguments: Vec<Value>) -> Result<Job> {
    now(engine, job_class_name, "perform", arguments)
}
