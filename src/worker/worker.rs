//! The worker execution contract.
//!
//! A worker host provides a name, claims jobs through the dispatcher, and
//! drives each claim through [`work`]. The hook sequence is fixed and never
//! reordered:
//!
//! 1. `before_<method>` hook
//! 2. `<method>` (output captured when `collect_output` is set)
//! 3. `after_<method>` hook
//! 4. `complete`
//!
//! Any handler error short-circuits the sequence: the job is failed with a
//! captured exception record, the error is logged with its trace and,
//! unless the engine is in inline mode, swallowed so the host loop can move
//! on to the next claim.
//!
//! Multiple workers may run `work` concurrently on different jobs; a single
//! job is exclusively owned by the worker that claimed it.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::engine::Engine;
use crate::job::exception::JobError;
use crate::job::job::{Job, LifecycleError, LogLevel};
use crate::types::{JobId, WorkerName};

/// Errors from the worker execution contract.
#[derive(Debug, Error)]
pub enum WorkError {
    /// `work` was invoked on a job that is not running.
    #[error("job {id} is not running (state: {state})")]
    InvalidState { id: JobId, state: &'static str },

    /// An unknown option was passed to `call_method`.
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// A lifecycle transition or store round-trip failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The user's handler failed. Only surfaced in inline mode; otherwise
    /// the failure is recorded on the job and swallowed.
    #[error(transparent)]
    Perform(#[from] JobError),
}

/// Result type for worker operations.
pub type Result<T> = std::result::Result<T, WorkError>;

/// A worker identity as seen by the queue.
///
/// The host owns the actual execution loop; this record carries the name
/// written onto claims and exception records.
#[derive(Debug, Clone)]
pub struct Worker {
    name: WorkerName,
    started_at: Option<DateTime<Utc>>,
}

impl Worker {
    pub fn new(name: impl Into<WorkerName>) -> Self {
        Worker {
            name: name.into(),
            started_at: None,
        }
    }

    pub fn name(&self) -> &WorkerName {
        &self.name
    }

    /// Marks the worker as started.
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn started(&self) -> bool {
        self.started_at.is_some()
    }
}

/// Hook phase selector for [`call_method`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Before,
    After,
}

impl HookEvent {
    fn prefix(&self) -> &'static str {
        match self {
            HookEvent::Before => "before",
            HookEvent::After => "after",
        }
    }
}

/// Options accepted by [`call_method`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Silences logs below the given level for the duration of the call.
    pub log_level: Option<LogLevel>,
}

impl CallOptions {
    /// Builds options from string-keyed pairs; any key other than
    /// `log_level` fails with a bad-argument error.
    pub fn from_pairs(pairs: &[(&str, Value)]) -> Result<Self> {
        let mut options = CallOptions::default();
        for (key, value) in pairs {
            match *key {
                "log_level" => {
                    let level: LogLevel = serde_json::from_value(value.clone())
                        .map_err(|_| WorkError::BadArgument(format!("log_level: {value}")))?;
                    options.log_level = Some(level);
                }
                other => return Err(WorkError::BadArgument(other.to_string())),
            }
        }
        Ok(options)
    }
}

/// Executes one claimed job: hooks, output capture, terminal transition.
///
/// Precondition: the job must be running (i.e., claimed). The returned
/// boolean tells the host whether to exclude this job from its next dispatch
/// lookup; it is always `false` here and reserved for batch
/// implementations.
///
/// # Errors
///
/// User handler errors are recorded via `fail` and swallowed, unless the
/// engine is in inline mode, where they re-raise after being recorded.
/// Store and transition errors always propagate.
pub fn work(engine: &Engine, job: &mut Job, worker: &Worker) -> Result<bool> {
    if !job.running() {
        return Err(WorkError::InvalidState {
            id: job.id,
            state: job.state.name(),
        });
    }

    let options = CallOptions {
        log_level: job.log_level,
    };
    let method = job.perform_method.clone();

    match run_sequence(engine, job, &method, &options) {
        Ok(()) => {
            job.complete(engine.store())?;
            Ok(false)
        }
        Err(user_error) => {
            if !job.failed() {
                job.fail(engine.store(), worker.name(), &user_error)?;
            }
            error!(
                job_id = %job.id,
                job_class = %job.job_class_name,
                worker_name = %worker.name(),
                error = %user_error,
                backtrace = ?job.exception.as_ref().map(|e| &e.backtrace),
                "job raised an exception"
            );
            if engine.inline_mode() {
                Err(user_error.into())
            } else {
                Ok(false)
            }
        }
    }
}

/// The before/perform/after sequence, stopping at the first handler error.
fn run_sequence(
    engine: &Engine,
    job: &mut Job,
    method: &str,
    options: &CallOptions,
) -> std::result::Result<(), JobError> {
    call_method(engine, job, method, Some(HookEvent::Before), options)?;

    let returned = call_method(engine, job, method, None, options)?;
    if job.collect_output {
        job.result = Some(wrap_result(returned.unwrap_or(Value::Null)));
    }

    call_method(engine, job, method, Some(HookEvent::After), options)?;
    Ok(())
}

/// A mapping return value is captured as-is; anything else is wrapped under
/// the `result` key.
fn wrap_result(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

/// Invokes a named method on the job if its type defines one.
///
/// With an event, the name resolves to `{event}_{method}`. Undefined
/// methods (or unregistered job classes) are silently skipped and return
/// `None`. Each invocation is benchmarked under the metric key
/// `rocketjob/{class}/{method}`.
pub fn call_method(
    engine: &Engine,
    job: &mut Job,
    method: &str,
    event: Option<HookEvent>,
    options: &CallOptions,
) -> std::result::Result<Option<Value>, JobError> {
    let name = match event {
        Some(e) => format!("{}_{}", e.prefix(), method),
        None => method.to_string(),
    };

    let Some(job_type) = engine.registry().get(&job.job_class_name) else {
        trace!(job_class = %job.job_class_name, method = %name, "job class not registered, skipping");
        return Ok(None);
    };
    let Some(handler) = job_type.handler(&name) else {
        trace!(job_class = %job.job_class_name, method = %name, "method not defined, skipping");
        return Ok(None);
    };

    let arguments = job.arguments.clone();
    let started = Instant::now();
    let outcome = handler(job, &arguments);
    log_metric(options.log_level, &job.job_class_name, &name, started.elapsed());
    outcome.map(Some)
}

/// Emits the per-invocation benchmark line at debug level, honoring the
/// per-call log-level gate.
fn log_metric(
    gate: Option<LogLevel>,
    job_class_name: &str,
    method: &str,
    elapsed: std::time::Duration,
) {
    if gate.is_some_and(|level| level > LogLevel::Debug) {
        return;
    }
    debug!(
        metric = %format!("rocketjob/{job_class_name}/{method}"),
        duration_us = elapsed.as_micros() as u64,
        "completed job method"
    );
}
