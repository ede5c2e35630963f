//! Shared fixtures for tests.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::engine::Engine;
use crate::job::exception::JobError;
use crate::job::job::Job;
use crate::job::registry::JobType;
use crate::store::MemoryStore;

/// Appends a marker to the job's `calls` field, used to observe hook order.
pub fn record_call(job: &mut Job, name: &str) {
    let calls = job
        .fields
        .entry("calls".to_string())
        .or_insert_with(|| json!([]));
    calls.as_array_mut().unwrap().push(json!(name));
}

/// An engine over a fresh in-memory store with a few job types registered:
///
/// - `noop_job`: perform returns null
/// - `echo_job`: perform returns its first argument
/// - `boom_job`: perform fails with `RuntimeError: boom`
/// - `hooked_job`: before/perform/after each record a marker in `calls`
pub fn test_engine() -> Engine {
    let engine = Engine::new(Arc::new(MemoryStore::new())).unwrap();

    engine.register(JobType::new("noop_job").with_handler("perform", |_, _| Ok(Value::Null)));

    engine.register(JobType::new("echo_job").with_handler("perform", |_, args| {
        Ok(args.first().cloned().unwrap_or(Value::Null))
    }));

    engine.register(
        JobType::new("boom_job")
            .with_handler("perform", |_, _| Err(JobError::new("RuntimeError", "boom"))),
    );

    engine.register(
        JobType::new("hooked_job")
            .with_handler("before_perform", |job, _| {
                record_call(job, "before_perform");
                Ok(Value::Null)
            })
            .with_handler("perform", |job, _| {
                record_call(job, "perform");
                Ok(json!({"rows": 3}))
            })
            .with_handler("after_perform", |job, _| {
                record_call(job, "after_perform");
                Ok(Value::Null)
            }),
    );

    engine
}
