//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different ID types (e.g., using a
//! `JobId` where an `EntryId` is expected) and make the code more
//! self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when parsing an invalid identifier.
#[derive(Debug, Clone, Error)]
#[error("invalid {kind} id: {input}")]
pub struct InvalidId {
    kind: &'static str,
    input: String,
}

/// The globally unique identifier of a job.
///
/// Also used by the directory monitor when minting the id embedded in an
/// archived file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Mints a fresh random id.
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    /// Parses an id from its string form.
    pub fn parse(s: &str) -> Result<Self, InvalidId> {
        Uuid::parse_str(s).map(JobId).map_err(|_| InvalidId {
            kind: "job",
            input: s.to_string(),
        })
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The globally unique identifier of a dirmon entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Mints a fresh random id.
    pub fn new() -> Self {
        EntryId(Uuid::new_v4())
    }

    /// Parses an id from its string form.
    pub fn parse(s: &str) -> Result<Self, InvalidId> {
        Uuid::parse_str(s).map(EntryId).map_err(|_| InvalidId {
            kind: "entry",
            input: s.to_string(),
        })
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name a worker host identifies itself with when claiming jobs.
///
/// The name is recorded on every claimed job and inside exception records, so
/// a stale claim can be traced back to the worker that held it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerName(String);

impl WorkerName {
    pub fn new(s: impl Into<String>) -> Self {
        WorkerName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerName {
    fn from(s: &str) -> Self {
        WorkerName(s.to_string())
    }
}

impl From<String> for WorkerName {
    fn from(s: String) -> Self {
        WorkerName(s)
    }
}
