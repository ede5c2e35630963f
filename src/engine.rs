//! The injectable runtime record.
//!
//! An `Engine` bundles everything the factory, dispatcher, worker, and
//! dirmon operations need: the store handle, the job registry, the
//! process-wide inline-mode flag, and the whitelist of scannable path
//! prefixes. Passing it by reference instead of reading true globals keeps
//! tests isolated from each other.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::dirmon;
use crate::error::PathError;
use crate::job::registry::{JobRegistry, JobType};
use crate::store::{DocumentStore, StoreError};

/// Shared runtime state for one deployment of the queue.
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    registry: JobRegistry,

    /// When true, `later` runs jobs synchronously in the caller and user
    /// errors propagate. Read-mostly; relaxed ordering is sufficient.
    inline_mode: AtomicBool,

    /// Ordered set of canonical absolute path prefixes dirmon entries may
    /// scan. Empty means the whitelist is disabled.
    whitelist_paths: RwLock<BTreeSet<String>>,
}

impl Engine {
    /// Creates an engine over the given store.
    ///
    /// Declares the unique index on dirmon entry patterns and registers the
    /// upload-file job type (its perform handler is supplied by the host).
    pub fn new(store: Arc<dyn DocumentStore>) -> Result<Self, StoreError> {
        store.create_unique_index(dirmon::DIRMON_COLLECTION, "pattern")?;

        let registry = JobRegistry::new();
        registry.register(dirmon::upload_file_job_type());

        Ok(Engine {
            store,
            registry,
            inline_mode: AtomicBool::new(false),
            whitelist_paths: RwLock::new(BTreeSet::new()),
        })
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Registers a job type. Convenience forwarding to the registry.
    pub fn register(&self, job_type: JobType) {
        self.registry.register(job_type);
    }

    // ─── Inline mode ───

    pub fn inline_mode(&self) -> bool {
        self.inline_mode.load(Ordering::Relaxed)
    }

    pub fn set_inline_mode(&self, enabled: bool) {
        self.inline_mode.store(enabled, Ordering::Relaxed);
    }

    // ─── Whitelist management ───

    /// Snapshot copy of the whitelist, in order.
    pub fn whitelist_paths(&self) -> Vec<String> {
        self.whitelist_paths
            .read()
            .unwrap()
            .iter()
            .cloned()
            .collect()
    }

    /// Canonicalizes and appends a whitelist path, returning the canonical
    /// string. The set deduplicates; adding an existing path is a no-op.
    pub fn add_whitelist_path(&self, path: impl AsRef<Path>) -> Result<String, PathError> {
        let canonical = canonicalize(path.as_ref())?;
        self.whitelist_paths
            .write()
            .unwrap()
            .insert(canonical.clone());
        Ok(canonical)
    }

    /// Canonicalizes and removes a whitelist path, returning the canonical
    /// string.
    pub fn delete_whitelist_path(&self, path: impl AsRef<Path>) -> Result<String, PathError> {
        let canonical = canonicalize(path.as_ref())?;
        self.whitelist_paths.write().unwrap().remove(&canonical);
        Ok(canonical)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("inline_mode", &self.inline_mode())
            .field("whitelist_paths", &self.whitelist_paths())
            .finish_non_exhaustive()
    }
}

/// Resolves a path via realpath semantics; missing paths are an error.
fn canonicalize(path: &Path) -> Result<String, PathError> {
    let resolved = std::fs::canonicalize(path).map_err(|source| PathError::NoSuchPath {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(resolved.to_string_lossy().into_owned())
}
