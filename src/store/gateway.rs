//! The document store gateway contract.
//!
//! The queue treats its store as a transactional document database with an
//! atomic find-and-modify. Everything the dispatcher's claim correctness
//! rests on is the serializability guarantee documented on
//! [`DocumentStore::find_and_modify`].

use std::collections::BTreeMap;

use thiserror::Error;

use super::document::{Document, Filter, SortKey, Update};

/// Errors surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected an insert or update.
    #[error("duplicate value for unique index {collection}.{field}: {value}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    /// The referenced document does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// A document could not be decoded into the expected record shape.
    #[error("malformed document in {collection}: {reason}")]
    Malformed { collection: String, reason: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Field under which every document carries its identifier.
pub const ID_FIELD: &str = "id";

/// A transactional document store.
///
/// Implementations must be safe to share across worker threads.
pub trait DocumentStore: Send + Sync {
    /// Atomically matches one document, applies the update, and returns the
    /// document as it was BEFORE the update.
    ///
    /// Matching honors `sort` (stable; storage order breaks ties). The call
    /// is serializable with respect to concurrent callers: when many callers
    /// race on the same matching document, exactly one of them observes it in
    /// its pre-update state. This is the claim token the dispatcher relies
    /// on.
    fn find_and_modify(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
        update: &Update,
    ) -> Result<Option<Document>>;

    /// Inserts a document, returning its id.
    ///
    /// The document must carry its id under [`ID_FIELD`]; unique indexes are
    /// enforced before the insert becomes visible.
    fn insert(&self, collection: &str, document: Document) -> Result<String>;

    /// Applies a patch to the document with the given id.
    fn update(&self, collection: &str, id: &str, patch: &Update) -> Result<()>;

    /// Replaces the document with the given id wholesale.
    ///
    /// Entities use this to persist a full post-image after a state
    /// transition; fields removed from the record disappear from the store.
    fn replace(&self, collection: &str, id: &str, document: Document) -> Result<()>;

    /// Removes the document with the given id. Removing an id that is no
    /// longer present is not an error.
    fn destroy(&self, collection: &str, id: &str) -> Result<()>;

    /// Fetches a single document by id.
    fn find(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Groups documents by the string value of `field` and counts each
    /// group. Documents without the field are not counted.
    ///
    /// This is the one aggregation shape the queue uses (state counts).
    fn count_by(&self, collection: &str, field: &str) -> Result<BTreeMap<String, u64>>;

    /// Declares a unique index over `field`. Subsequent inserts and updates
    /// that would duplicate an existing value fail with
    /// [`StoreError::DuplicateKey`].
    fn create_unique_index(&self, collection: &str, field: &str) -> Result<()>;
}
