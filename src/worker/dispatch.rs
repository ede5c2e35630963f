//! The dispatcher: atomic claim of the next runnable job.
//!
//! The claim is a single compound store update (set `worker_name` and
//! promote to `running`) issued through `find_and_modify`. The state change
//! IS the claim token: because the store applies it atomically, two workers
//! can never claim the same queued job.
//!
//! Two kinds of document match the dispatch query:
//!
//! - queued jobs whose `run_at` is absent or due, and
//! - running jobs marked `sub_state = processing`: in-flight batch jobs that
//!   may be handed to additional workers without re-firing their start
//!   callbacks.
//!
//! The claim loop also reaps expired queued jobs: an expired claim is
//! destroyed and the loop continues to the next candidate.

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::InvalidTransition;
use crate::job::job::{JOBS_COLLECTION, Job, LifecycleError};
use crate::store::{Filter, SortKey, StoreError, Update};
use crate::types::{JobId, WorkerName};

/// Errors from dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Atomically claims the highest-priority runnable job for `worker_name`.
///
/// Candidates are ordered by `(priority asc, created_at asc)`; storage order
/// breaks remaining ties. `skip_ids` excludes jobs this worker has chosen
/// not to re-claim (batch hosts use this between slices).
///
/// Returns `None` when nothing is runnable.
pub fn next_job(
    engine: &Engine,
    worker_name: &WorkerName,
    skip_ids: &[JobId],
) -> Result<Option<Job>> {
    let store = engine.store();
    let sort = [SortKey::asc("priority"), SortKey::asc("created_at")];
    let claim = Update::new()
        .set("worker_name", json!(worker_name.as_str()))
        .set("state", json!("running"));

    loop {
        let filter = runnable_filter(skip_ids);
        let Some(doc) = store.find_and_modify(JOBS_COLLECTION, &filter, &sort, &claim)? else {
            return Ok(None);
        };

        // The pre-update image tells us which query branch matched.
        let mut job = Job::from_document(doc)?;

        if job.running() {
            // An in-flight batch job acquiring an additional worker; start
            // already fired at the original claim and started_at stands.
            job.worker_name = Some(worker_name.clone());
            debug!(
                job_id = %job.id,
                job_class = %job.job_class_name,
                worker_name = %worker_name,
                "claimed additional worker slot on running batch job"
            );
            return Ok(Some(job));
        }

        if job.expired() {
            job.destroy(store)?;
            info!(
                job_id = %job.id,
                job_class = %job.job_class_name,
                "destroyed expired job instead of starting it"
            );
            continue;
        }

        job.worker_name = Some(worker_name.clone());
        job.start()?;
        job.persist(store)?;
        debug!(
            job_id = %job.id,
            job_class = %job.job_class_name,
            worker_name = %worker_name,
            priority = job.priority,
            "claimed job"
        );
        return Ok(Some(job));
    }
}

/// The dispatch query: queued (and due) jobs, plus running batch jobs with
/// claimable work, minus the ids the caller wants skipped.
fn runnable_filter(skip_ids: &[JobId]) -> Filter {
    let mut clauses = vec![
        Filter::Any(vec![
            Filter::Eq("state".into(), json!("queued")),
            Filter::All(vec![
                Filter::Eq("state".into(), json!("running")),
                Filter::Eq("sub_state".into(), json!("processing")),
            ]),
        ]),
        Filter::Any(vec![
            Filter::Absent("run_at".into()),
            Filter::Lte("run_at".into(), json!(chrono::Utc::now())),
        ]),
    ];
    if !skip_ids.is_empty() {
        clauses.push(Filter::Nin(
            "id".into(),
            skip_ids.iter().map(|id| json!(id.to_string())).collect(),
        ));
    }
    Filter::All(clauses)
}
