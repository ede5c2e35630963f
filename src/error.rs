//! Crate-level error types.
//!
//! Each subsystem defines its own error enum next to its implementation (the
//! store, worker, factory, and dirmon modules); this module holds the errors
//! shared by more than one subsystem and the top-level aggregate.

use std::path::PathBuf;

use thiserror::Error;

/// Error returned when a state machine rejects an event.
///
/// The persisted state is unchanged when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event}")]
pub struct InvalidTransition {
    /// Name of the state the record was in.
    pub from: &'static str,
    /// Name of the rejected event.
    pub event: &'static str,
}

/// Filesystem path errors raised by whitelist management and archival.
#[derive(Debug, Error)]
pub enum PathError {
    /// The path does not exist (or could not be created, for directory
    /// trees).
    #[error("no such path: {}", .path.display())]
    NoSuchPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other IO failure, tagged with the path being operated on.
    #[error("IO error at {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error aggregating every subsystem.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Work(#[from] crate::worker::WorkError),

    #[error(transparent)]
    Factory(#[from] crate::job::FactoryError),

    #[error(transparent)]
    Dirmon(#[from] crate::dirmon::DirmonError),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Result type for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;
