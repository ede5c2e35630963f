//! Persistent directory-monitor rules.
//!
//! A dirmon entry names a glob pattern, the job class that consumes matching
//! files, and where to archive them. An external dirmon driver scans enabled
//! entries on its own schedule; per entry it calls [`DirmonEntry::each`] to
//! discover files and [`DirmonEntry::later`] to archive each one and enqueue
//! the follow-on upload job.
//!
//! # State machine
//!
//! ```text
//! pending --enable--> enabled --disable--> disabled --enable--> enabled
//!                        \--fail--> failed --disable--> disabled
//! ```
//!
//! A failed entry stops scanning until it is manually disabled and
//! re-enabled.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{InvalidTransition, PathError};
use crate::job::exception::{JobError, JobException};
use crate::job::factory::FactoryError;
use crate::job::job::Job;
use crate::job::registry::JobRegistry;
use crate::store::{Document, DocumentStore, StoreError};
use crate::types::{EntryId, JobId, WorkerName};

use super::upload::UploadFileJob;

/// Collection holding dirmon entry documents.
pub const DIRMON_COLLECTION: &str = "rocket_job.dirmon_entries";

/// Lifecycle state of a dirmon entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirmonState {
    /// Created, awaiting approval.
    Pending,

    /// Scanned by the dirmon driver.
    Enabled,

    /// Manually switched off.
    Disabled,

    /// Stopped by a policy or IO violation; carries an exception record.
    Failed,
}

impl DirmonState {
    pub fn name(&self) -> &'static str {
        match self {
            DirmonState::Pending => "pending",
            DirmonState::Enabled => "enabled",
            DirmonState::Disabled => "disabled",
            DirmonState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DirmonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Events accepted by the entry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirmonEvent {
    Enable,
    Disable,
    Fail,
}

impl DirmonEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DirmonEvent::Enable => "enable",
            DirmonEvent::Disable => "disable",
            DirmonEvent::Fail => "fail",
        }
    }
}

/// Computes the next entry state for an event, or rejects it.
pub fn next_entry_state(
    current: DirmonState,
    event: DirmonEvent,
) -> std::result::Result<DirmonState, InvalidTransition> {
    match (current, event) {
        (DirmonState::Pending, DirmonEvent::Enable) => Ok(DirmonState::Enabled),
        (DirmonState::Disabled, DirmonEvent::Enable) => Ok(DirmonState::Enabled),
        (DirmonState::Enabled, DirmonEvent::Disable) => Ok(DirmonState::Disabled),
        (DirmonState::Failed, DirmonEvent::Disable) => Ok(DirmonState::Disabled),
        (DirmonState::Enabled, DirmonEvent::Fail) => Ok(DirmonState::Failed),
        (from, event) => Err(InvalidTransition {
            from: from.name(),
            event: event.name(),
        }),
    }
}

/// All the reasons a save was rejected, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dirmon entry validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Errors from dirmon entry operations.
#[derive(Debug, Error)]
pub enum DirmonError {
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Path(#[from] PathError),

    /// Enqueueing the upload job failed.
    #[error(transparent)]
    Factory(#[from] FactoryError),
}

/// Result type for dirmon entry operations.
pub type Result<T> = std::result::Result<T, DirmonError>;

/// A persistent directory-monitoring rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirmonEntry {
    pub id: EntryId,

    /// Human-readable name, used in logs and upload job descriptions.
    pub name: String,

    /// Glob pattern scanned for new files. Unique across entries.
    pub pattern: String,

    /// Class the uploaded file will feed. Must resolve in the job registry.
    pub job_class_name: String,

    /// Attribute assignments applied to the target job class; every key must
    /// name a settable attribute on that class.
    #[serde(default)]
    pub properties: Map<String, Value>,

    /// Where discovered files are moved; relative paths resolve against the
    /// discovered file's parent directory.
    pub archive_directory: String,

    pub state: DirmonState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<JobException>,

    pub created_at: DateTime<Utc>,
}

impl DirmonEntry {
    /// Creates an in-memory entry in the `pending` state. Not persisted.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        job_class_name: impl Into<String>,
        archive_directory: impl Into<String>,
    ) -> Self {
        DirmonEntry {
            id: EntryId::new(),
            name: name.into(),
            pattern: pattern.into(),
            job_class_name: job_class_name.into(),
            properties: Map::new(),
            archive_directory: archive_directory.into(),
            state: DirmonState::Pending,
            exception: None,
            created_at: Utc::now(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.state == DirmonState::Enabled
    }

    pub fn failed(&self) -> bool {
        self.state == DirmonState::Failed
    }

    // ─── Document conversion ───

    pub fn to_document(&self) -> std::result::Result<Document, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => Err(StoreError::Malformed {
                collection: DIRMON_COLLECTION.to_string(),
                reason: "entry did not serialize to an object".to_string(),
            }),
        }
    }

    pub fn from_document(doc: Document) -> std::result::Result<Self, StoreError> {
        serde_json::from_value(Value::Object(doc)).map_err(|e| StoreError::Malformed {
            collection: DIRMON_COLLECTION.to_string(),
            reason: e.to_string(),
        })
    }

    /// Loads an entry by id.
    pub fn load(
        store: &dyn DocumentStore,
        id: EntryId,
    ) -> std::result::Result<Option<Self>, StoreError> {
        store
            .find(DIRMON_COLLECTION, &id.to_string())?
            .map(Self::from_document)
            .transpose()
    }

    // ─── Persistence ───

    /// Validates and inserts the entry.
    ///
    /// Required string fields are whitespace-trimmed first. The unique index
    /// on `pattern` rejects a second entry scanning the same pattern.
    pub fn create(&mut self, engine: &Engine) -> Result<()> {
        self.trim_fields();
        self.validate(engine.registry())?;
        engine
            .store()
            .insert(DIRMON_COLLECTION, self.to_document()?)?;
        debug!(dirmon_entry = %self.name, pattern = %self.pattern, "dirmon entry created");
        Ok(())
    }

    /// Validates and persists field edits on an existing entry.
    pub fn save(&mut self, engine: &Engine) -> Result<()> {
        self.trim_fields();
        self.validate(engine.registry())?;
        self.persist(engine.store())?;
        Ok(())
    }

    fn trim_fields(&mut self) {
        self.name = self.name.trim().to_string();
        self.pattern = self.pattern.trim().to_string();
        self.job_class_name = self.job_class_name.trim().to_string();
        self.archive_directory = self.archive_directory.trim().to_string();
    }

    fn persist(&self, store: &dyn DocumentStore) -> std::result::Result<(), StoreError> {
        store.replace(DIRMON_COLLECTION, &self.id.to_string(), self.to_document()?)
    }

    /// Checks the entry against the registry, reporting every problem at
    /// once.
    ///
    /// Registered types satisfy the job contract by construction, so class
    /// validation reduces to resolution plus the per-property attribute
    /// check.
    pub fn validate(&self, registry: &JobRegistry) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.pattern.is_empty() {
            errors.push("pattern is required".to_string());
        }
        if self.archive_directory.is_empty() {
            errors.push("archive_directory is required".to_string());
        }
        if self.job_class_name.is_empty() {
            errors.push("job_class_name is required".to_string());
        } else {
            match registry.get(&self.job_class_name) {
                None => errors.push(format!(
                    "job_class_name {} is not a registered job type",
                    self.job_class_name
                )),
                Some(job_type) => {
                    for key in self.properties.keys() {
                        if !job_type.has_attribute(key) {
                            errors.push(format!(
                                "property {} is not a settable attribute on {}",
                                key, self.job_class_name
                            ));
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }

    // ─── State machine ───

    /// `pending|disabled -> enabled`. Persists the post-image.
    pub fn enable(&mut self, engine: &Engine) -> Result<()> {
        self.state = next_entry_state(self.state, DirmonEvent::Enable)?;
        self.persist(engine.store())?;
        debug!(dirmon_entry = %self.name, "dirmon entry enabled");
        Ok(())
    }

    /// `enabled|failed -> disabled`. Persists the post-image.
    pub fn disable(&mut self, engine: &Engine) -> Result<()> {
        self.state = next_entry_state(self.state, DirmonEvent::Disable)?;
        self.persist(engine.store())?;
        debug!(dirmon_entry = %self.name, "dirmon entry disabled");
        Ok(())
    }

    /// `enabled -> failed`, capturing the exception record before the state
    /// is assigned. Persists the post-image.
    pub fn fail(
        &mut self,
        engine: &Engine,
        worker_name: &WorkerName,
        error: &JobError,
    ) -> Result<()> {
        let next = next_entry_state(self.state, DirmonEvent::Fail)?;
        self.exception = Some(JobException::capture(error, worker_name));
        self.state = next;
        self.persist(engine.store())?;
        info!(
            dirmon_entry = %self.name,
            worker_name = %worker_name,
            error = %error,
            "dirmon entry failed"
        );
        Ok(())
    }

    /// [`fail`](Self::fail) with a bare message instead of a handler error.
    pub fn fail_with_message(
        &mut self,
        engine: &Engine,
        worker_name: &WorkerName,
        message: &str,
    ) -> Result<()> {
        self.fail(engine, worker_name, &JobError::new("RuntimeError", message))
    }

    // ─── Enqueue ───

    /// Archives a discovered file and enqueues the follow-on upload job.
    ///
    /// Mints a fresh job id, moves the file to
    /// `archive_directory/{job_id}_{basename}`, and persists an upload job
    /// carrying both file names. Archival errors surface to the caller; the
    /// file is not enqueued unless it was archived.
    pub fn later(&self, engine: &Engine, pathname: &Path) -> Result<Job> {
        let job_id = JobId::new();
        let archived = self.archive_file(job_id, pathname)?;

        let basename = pathname
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let upload_job = UploadFileJob {
            job_class_name: self.job_class_name.clone(),
            properties: self.properties.clone(),
            description: format!("{}: {}", self.name, basename),
            upload_file_name: archived.clone(),
            original_file_name: pathname.to_path_buf(),
            job_id,
        }
        .create(engine)?;

        info!(
            dirmon_entry = %self.name,
            original_file_name = %pathname.display(),
            upload_file_name = %archived.display(),
            job_id = %job_id,
            upload_job_id = %upload_job.id,
            "archived file and enqueued upload job"
        );
        Ok(upload_job)
    }
}

/// Counts persisted entries grouped by state name. States with no entries
/// are absent from the mapping.
pub fn counts_by_state(
    store: &dyn DocumentStore,
) -> std::result::Result<BTreeMap<String, u64>, StoreError> {
    store.count_by(DIRMON_COLLECTION, "state")
}
