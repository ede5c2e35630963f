//! Document store gateway and its in-memory implementation.
//!
//! The store is the sole synchronization authority for claim handoff: the
//! atomicity of [`DocumentStore::find_and_modify`] is what prevents two
//! workers from ever claiming the same queued job.

pub mod document;
pub mod gateway;
pub mod memory;

pub use document::{Document, Filter, SortKey, SortOrder, Update};
pub use gateway::{DocumentStore, ID_FIELD, StoreError};
pub use memory::MemoryStore;
