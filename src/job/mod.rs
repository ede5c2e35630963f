//! The job entity, its state machine, the type registry, and the factory.
//!
//! A job's life: the factory builds it (defaults hook, caller configuration),
//! `later` persists it queued, the dispatcher claims it atomically, the
//! worker drives the hook sequence, and the terminal state is persisted with
//! any captured output or exception.

pub mod exception;
pub mod factory;
pub mod job;
pub mod registry;
pub mod state;

pub use exception::{JobError, JobException};
pub use factory::FactoryError;
pub use job::{DEFAULT_PRIORITY, JOBS_COLLECTION, Job, LifecycleError, LogLevel, counts_by_state};
pub use registry::{Handler, HandlerResult, JobRegistry, JobType};
pub use state::{JobEvent, JobState, SubState, next_state};
