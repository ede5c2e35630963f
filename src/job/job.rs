//! The persistent job record and its lifecycle operations.
//!
//! A `Job` is created by the factory, persisted on `later`, claimed
//! atomically by the dispatcher, and mutated only by its claiming worker
//! until it reaches a terminal state. Terminal jobs are retained for
//! inspection; the host decides when to delete them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::InvalidTransition;
use crate::store::{Document, DocumentStore, StoreError, Update};
use crate::types::{JobId, WorkerName};

use super::exception::{JobError, JobException};
use super::state::{JobEvent, JobState, SubState, next_state};

/// Collection holding job documents.
pub const JOBS_COLLECTION: &str = "rocket_job.jobs";

/// Default priority for new jobs. Lower numeric value runs first.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Per-job override for hook logging verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Errors from job lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The state machine rejected the event; persisted state is unchanged.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    /// Store round-trip failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for job lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// A persistent job.
///
/// Class-specific attributes (for example the upload job's file names) live
/// in `fields` and are flattened into the document at the top level, the way
/// a schemaless job class would persist them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Registered class name; resolved through the job registry when the
    /// worker invokes handlers.
    pub job_class_name: String,

    /// Symbolic name of the method to invoke; hooks derive from it
    /// (`before_<m>` / `after_<m>`).
    pub perform_method: String,

    /// Argument values passed to every handler, preserved verbatim across
    /// persistence.
    #[serde(default)]
    pub arguments: Vec<Value>,

    pub state: JobState,

    /// Only `processing` is meaningful to the dispatcher: a running batch
    /// job that still has claimable work.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_state: Option<SubState>,

    /// Lower numeric value = higher priority.
    pub priority: i32,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Do not dispatch before this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,

    /// Name of the worker holding the claim; unset while queued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<WorkerName>,

    /// When true, the return value of the perform handler is captured into
    /// `result`.
    #[serde(default)]
    pub collect_output: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,

    /// If past at claim time, the job is destroyed instead of started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<JobException>,

    /// Per-job override for hook logging verbosity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Class-specific attributes, flattened into the document.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Job {
    /// Creates an in-memory job with default settings. Not persisted.
    pub fn new(job_class_name: impl Into<String>) -> Self {
        Job {
            id: JobId::new(),
            job_class_name: job_class_name.into(),
            perform_method: "perform".to_string(),
            arguments: Vec::new(),
            state: JobState::Queued,
            sub_state: None,
            priority: DEFAULT_PRIORITY,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            run_at: None,
            worker_name: None,
            collect_output: false,
            result: None,
            expires_at: None,
            exception: None,
            log_level: None,
            description: None,
            fields: Map::new(),
        }
    }

    // ─── Predicates ───

    pub fn queued(&self) -> bool {
        self.state == JobState::Queued
    }

    pub fn running(&self) -> bool {
        self.state == JobState::Running
    }

    pub fn completed(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn failed(&self) -> bool {
        self.state == JobState::Failed
    }

    /// Whether `expires_at` is set and in the past.
    pub fn expired(&self) -> bool {
        self.expires_at.is_some_and(|t| t <= Utc::now())
    }

    // ─── Document conversion ───

    pub fn to_document(&self) -> std::result::Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(StoreError::Malformed {
                collection: JOBS_COLLECTION.to_string(),
                reason: "job did not serialize to an object".to_string(),
            }),
        }
    }

    pub fn from_document(doc: Document) -> std::result::Result<Self, StoreError> {
        serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Malformed {
            collection: JOBS_COLLECTION.to_string(),
            reason: e.to_string(),
        })
    }

    /// Loads a job by id.
    pub fn load(
        store: &dyn DocumentStore,
        id: JobId,
    ) -> std::result::Result<Option<Self>, StoreError> {
        store
            .find(JOBS_COLLECTION, &id.to_string())?
            .map(Self::from_document)
            .transpose()
    }

    // ─── Lifecycle ───

    /// Transitions `queued -> running` and stamps `started_at`.
    ///
    /// Does not persist; the dispatcher persists the post-image after the
    /// claim, and inline execution never persists at all.
    pub fn start(&mut self) -> std::result::Result<(), InvalidTransition> {
        self.state = next_state(self.state, JobEvent::Start)?;
        self.started_at = Some(Utc::now());
        debug!(job_id = %self.id, job_class = %self.job_class_name, "job started");
        Ok(())
    }

    /// Transitions `running -> completed` and persists the post-image.
    ///
    /// Calling on an already-terminal job fails with an invalid-transition
    /// error and leaves the persisted state unchanged.
    pub fn complete(&mut self, store: &dyn DocumentStore) -> Result<()> {
        self.state = next_state(self.state, JobEvent::Complete)?;
        self.completed_at = Some(Utc::now());
        self.persist(store)?;
        debug!(job_id = %self.id, job_class = %self.job_class_name, "job completed");
        Ok(())
    }

    /// Captures the exception record, transitions `running -> failed`, and
    /// persists. No-op if the job is already failed.
    pub fn fail(
        &mut self,
        store: &dyn DocumentStore,
        worker_name: &WorkerName,
        error: &JobError,
    ) -> Result<()> {
        if self.failed() {
            return Ok(());
        }
        self.state = next_state(self.state, JobEvent::Fail)?;
        self.exception = Some(JobException::capture(error, worker_name));
        self.completed_at = Some(Utc::now());
        self.persist(store)?;
        debug!(
            job_id = %self.id,
            job_class = %self.job_class_name,
            worker_name = %worker_name,
            error = %error,
            "job failed"
        );
        Ok(())
    }

    /// Removes the job from the store. Only queued and failed jobs may be
    /// destroyed.
    pub fn destroy(&self, store: &dyn DocumentStore) -> Result<()> {
        if !matches!(self.state, JobState::Queued | JobState::Failed) {
            return Err(InvalidTransition {
                from: self.state.name(),
                event: "destroy",
            }
            .into());
        }
        store.destroy(JOBS_COLLECTION, &self.id.to_string())?;
        Ok(())
    }

    /// Applies a partial patch to the record and the store without going
    /// through a state transition.
    pub fn set(&mut self, store: &dyn DocumentStore, patch: &Update) -> Result<()> {
        let mut doc = self.to_document()?;
        patch.apply(&mut doc);
        *self = Job::from_document(doc)?;
        match store.update(JOBS_COLLECTION, &self.id.to_string(), patch) {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persists the full post-image.
    ///
    /// A job that was never enqueued (inline execution) has no stored
    /// document; its transitions then apply in memory only.
    pub fn persist(&self, store: &dyn DocumentStore) -> std::result::Result<(), StoreError> {
        let doc = self.to_document()?;
        match store.replace(JOBS_COLLECTION, &self.id.to_string(), doc) {
            Ok(()) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Counts persisted jobs grouped by state name.
pub fn counts_by_state(
    store: &dyn DocumentStore,
) -> std::result::Result<BTreeMap<String, u64>, StoreError> {
    store.count_by(JOBS_COLLECTION, "state")
}
