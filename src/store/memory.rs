//! In-memory implementation of the document store gateway.
//!
//! A single mutex over all collections makes every operation, in particular
//! `find_and_modify`, trivially serializable. Documents are kept in
//! insertion order, which provides the stable tie-break the dispatcher's
//! sort contract requires.
//!
//! This store backs the test suite and inline deployments. A server-backed
//! gateway implementing the same trait is a host concern.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde_json::Value;

use super::document::{Document, Filter, SortKey, Update, compare_documents};
use super::gateway::{DocumentStore, ID_FIELD, Result, StoreError};

#[derive(Default)]
struct Collection {
    /// Documents in insertion order.
    documents: Vec<Document>,
    /// Fields with a unique index.
    unique_fields: Vec<String>,
}

impl Collection {
    fn position(&self, id: &str) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| d.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }

    /// Checks that `doc` would not violate a unique index, ignoring the
    /// document at `skip` (its own slot during an update).
    fn check_unique(&self, collection: &str, doc: &Document, skip: Option<usize>) -> Result<()> {
        for field in &self.unique_fields {
            let Some(value) = doc.get(field).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self
                .documents
                .iter()
                .enumerate()
                .any(|(i, other)| Some(i) != skip && other.get(field) == Some(value));
            if clash {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    field: field.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// In-memory document store.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

fn document_id(collection: &str, document: &Document) -> Result<String> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Malformed {
            collection: collection.to_string(),
            reason: format!("missing string `{ID_FIELD}` field"),
        })
}

impl DocumentStore for MemoryStore {
    fn find_and_modify(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
        update: &Update,
    ) -> Result<Option<Document>> {
        let mut collections = self.collections.lock().unwrap();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(None);
        };

        // Stable sort of the matching positions; ties keep insertion order.
        let mut matching: Vec<usize> = coll
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| filter.matches(d))
            .map(|(i, _)| i)
            .collect();
        matching.sort_by(|&a, &b| compare_documents(&coll.documents[a], &coll.documents[b], sort));

        let Some(&index) = matching.first() else {
            return Ok(None);
        };

        let before = coll.documents[index].clone();
        let mut after = before.clone();
        update.apply(&mut after);
        coll.check_unique(collection, &after, Some(index))?;
        coll.documents[index] = after;
        Ok(Some(before))
    }

    fn insert(&self, collection: &str, document: Document) -> Result<String> {
        let id = document_id(collection, &document)?;
        let mut collections = self.collections.lock().unwrap();
        let coll = collections.entry(collection.to_string()).or_default();
        coll.check_unique(collection, &document, None)?;
        coll.documents.push(document);
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, patch: &Update) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let index = coll.position(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        let mut after = coll.documents[index].clone();
        patch.apply(&mut after);
        coll.check_unique(collection, &after, Some(index))?;
        coll.documents[index] = after;
        Ok(())
    }

    fn replace(&self, collection: &str, id: &str, document: Document) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        let index = coll.position(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;

        coll.check_unique(collection, &document, Some(index))?;
        coll.documents[index] = document;
        Ok(())
    }

    fn destroy(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(coll) = collections.get_mut(collection)
            && let Some(index) = coll.position(id)
        {
            coll.documents.remove(index);
        }
        Ok(())
    }

    fn find(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|coll| coll.position(id).map(|i| coll.documents[i].clone())))
    }

    fn count_by(&self, collection: &str, field: &str) -> Result<BTreeMap<String, u64>> {
        let collections = self.collections.lock().unwrap();
        let mut counts = BTreeMap::new();
        if let Some(coll) = collections.get(collection) {
            for doc in &coll.documents {
                if let Some(value) = doc.get(field).and_then(Value::as_str) {
                    *counts.entry(value.to_string()).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    fn create_unique_index(&self, collection: &str, field: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let coll = collections.entry(collection.to_string()).or_default();
        if !coll.unique_fields.iter().any(|f| f == field) {
            coll.unique_fields.push(field.to_string());
        }
        Ok(())
    }
}
