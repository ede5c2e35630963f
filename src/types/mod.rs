//! Core domain types for the job queue.
//!
//! This module contains the fundamental identifier types used throughout the
//! crate, designed to encode invariants via the type system.

pub mod ids;

// Re-export commonly used types at the module level
pub use ids::{EntryId, InvalidId, JobId, WorkerName};
