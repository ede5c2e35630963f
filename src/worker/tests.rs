//! Scenario tests for dispatch and execution.
//!
//! These exercise the dispatcher and worker contract end to end against the
//! in-memory store: claim ordering, contention, expiry reaping, failure
//! capture, and the hook sequence.

use std::sync::Mutex;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;

use crate::job::factory::{self, FactoryError};
use crate::job::job::{JOBS_COLLECTION, Job};
use crate::job::state::{JobState, SubState};
use crate::test_utils::test_engine;
use crate::types::{JobId, WorkerName};

use super::dispatch::next_job;
use super::worker::{WorkError, Worker, work};

// ─── Claiming ───

#[test]
fn single_job_happy_path() {
    let engine = test_engine();
    let worker = Worker::new("w1");
    let queued = factory::perform_later(&engine, "noop_job", vec![]).unwrap();

    let mut claimed = next_job(&engine, worker.name(), &[]).unwrap().unwrap();
    assert_eq!(claimed.id, queued.id);

    let stored = Job::load(engine.store(), queued.id).unwrap().unwrap();
    assert_eq!(stored.state, JobState::Running);
    assert_eq!(stored.worker_name, Some(WorkerName::new("w1")));
    assert!(stored.started_at.is_some());

    let exclude = work(&engine, &mut claimed, &worker).unwrap();
    assert!(!exclude);

    let stored = Job::load(engine.store(), queued.id).unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
}

#[test]
fn claims_follow_priority_then_created_at() {
    let engine = test_engine();
    let base = Utc::now() - Duration::minutes(10);

    let j1 = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.priority = 70;
        job.created_at = base;
    })
    .unwrap();
    let j2 = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.priority = 30;
        job.created_at = base + Duration::seconds(1);
    })
    .unwrap();
    let j3 = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.priority = 30;
        job.created_at = base;
    })
    .unwrap();

    let worker_name = WorkerName::new("w1");
    let order: Vec<JobId> = (0..3)
        .map(|_| next_job(&engine, &worker_name, &[]).unwrap().unwrap().id)
        .collect();
    assert_eq!(order, vec![j3.id, j2.id, j1.id]);
    assert!(next_job(&engine, &worker_name, &[]).unwrap().is_none());
}

#[test]
fn contending_workers_claim_each_job_exactly_once() {
    let engine = test_engine();
    let job_count = 10;
    let worker_count = 50;

    for _ in 0..job_count {
        factory::perform_later(&engine, "noop_job", vec![]).unwrap();
    }

    let claims: Mutex<Vec<(String, JobId)>> = Mutex::new(Vec::new());
    let misses = Mutex::new(0u32);

    std::thread::scope(|scope| {
        for i in 0..worker_count {
            let claims = &claims;
            let misses = &misses;
            let engine = &engine;
            scope.spawn(move || {
                let name = WorkerName::new(format!("w{i}"));
                match next_job(engine, &name, &[]).unwrap() {
                    Some(job) => claims.lock().unwrap().push((name.as_str().to_string(), job.id)),
                    None => *misses.lock().unwrap() += 1,
                }
            });
        }
    });

    let claims = claims.into_inner().unwrap();
    assert_eq!(claims.len(), job_count);
    assert_eq!(misses.into_inner().unwrap(), (worker_count - job_count) as u32);

    let mut ids: Vec<JobId> = claims.iter().map(|(_, id)| *id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), job_count, "no job was claimed twice");

    for (claimer, id) in &claims {
        let stored = Job::load(engine.store(), *id).unwrap().unwrap();
        assert_eq!(stored.worker_name, Some(WorkerName::new(claimer.clone())));
    }
}

#[test]
fn expired_queued_jobs_are_destroyed_at_claim_time() {
    let engine = test_engine();
    let job = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.expires_at = Some(Utc::now() - Duration::minutes(1));
    })
    .unwrap();

    assert!(next_job(&engine, &WorkerName::new("w1"), &[]).unwrap().is_none());
    assert!(Job::load(engine.store(), job.id).unwrap().is_none());
}

#[test]
fn future_run_at_is_not_dispatchable() {
    let engine = test_engine();
    factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.run_at = Some(Utc::now() + Duration::hours(1));
    })
    .unwrap();

    assert!(next_job(&engine, &WorkerName::new("w1"), &[]).unwrap().is_none());
}

#[test]
fn due_run_at_is_dispatchable() {
    let engine = test_engine();
    let job = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.run_at = Some(Utc::now() - Duration::seconds(5));
    })
    .unwrap();

    let claimed = next_job(&engine, &WorkerName::new("w1"), &[]).unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
}

#[test]
fn skip_ids_excludes_jobs_from_the_lookup() {
    let engine = test_engine();
    let first = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
        job.priority = 1;
    })
    .unwrap();
    let second = factory::perform_later(&engine, "noop_job", vec![]).unwrap();

    let claimed = next_job(&engine, &WorkerName::new("w1"), &[first.id])
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, second.id);
}

#[test]
fn running_batch_job_accepts_additional_workers_without_restarting() {
    let engine = test_engine();
    let worker_name = WorkerName::new("w1");

    let queued = factory::perform_later(&engine, "noop_job", vec![]).unwrap();
    let claimed = next_job(&engine, &worker_name, &[]).unwrap().unwrap();
    let original_started_at = Job::load(engine.store(), queued.id)
        .unwrap()
        .unwrap()
        .started_at
        .unwrap();

    // Mark the running job as a batch with claimable work.
    let mut running = claimed;
    running
        .set(
            engine.store(),
            &crate::store::Update::new().set("sub_state", json!("processing")),
        )
        .unwrap();

    let second = next_job(&engine, &WorkerName::new("w2"), &[]).unwrap().unwrap();
    assert_eq!(second.id, queued.id);
    assert_eq!(second.state, JobState::Running);
    assert_eq!(second.sub_state, Some(SubState::Processing));
    assert_eq!(second.worker_name, Some(WorkerName::new("w2")));

    let stored = Job::load(engine.store(), queued.id).unwrap().unwrap();
    assert_eq!(
        stored.started_at.unwrap(),
        original_started_at,
        "start must not re-fire for an in-flight batch job"
    );
}

// ─── Execution ───

#[test]
fn work_requires_a_running_job() {
    let engine = test_engine();
    let worker = Worker::new("w1");
    let mut job = factory::perform_later(&engine, "noop_job", vec![]).unwrap();

    let err = work(&engine, &mut job, &worker).unwrap_err();
    assert!(matches!(err, WorkError::InvalidState { .. }));
}

#[test]
fn hooks_run_in_order_around_perform() {
    let engine = test_engine();
    let job = factory::perform_now(&engine, "hooked_job", vec![]).unwrap();
    assert_eq!(
        job.fields.get("calls"),
        Some(&json!(["before_perform", "perform", "after_perform"]))
    );
    assert_eq!(job.state, JobState::Completed);
}

#[test]
fn collect_output_captures_mapping_and_wraps_scalars() {
    let engine = test_engine();

    let mapping = factory::now_with(&engine, "hooked_job", "perform", vec![], |job| {
        job.collect_output = true;
    })
    .unwrap();
    assert_eq!(mapping.result.unwrap().get("rows"), Some(&json!(3)));

    let scalar = factory::now_with(&engine, "echo_job", "perform", vec![json!(7)], |job| {
        job.collect_output = true;
    })
    .unwrap();
    assert_eq!(scalar.result.unwrap().get("result"), Some(&json!(7)));
}

#[test]
fn output_is_discarded_without_collect_output() {
    let engine = test_engine();
    let job = factory::perform_now(&engine, "echo_job", vec![json!(7)]).unwrap();
    assert!(job.result.is_none());
}

#[test]
fn handler_failure_is_captured_and_swallowed() {
    let engine = test_engine();
    let worker = Worker::new("w1");
    factory::perform_later(&engine, "boom_job", vec![]).unwrap();

    let mut claimed = next_job(&engine, worker.name(), &[]).unwrap().unwrap();
    let exclude = work(&engine, &mut claimed, &worker).unwrap();
    assert!(!exclude, "failures are swallowed outside inline mode");

    let stored = Job::load(engine.store(), claimed.id).unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    let exception = stored.exception.unwrap();
    assert_eq!(exception.class_name, "RuntimeError");
    assert_eq!(exception.message, "boom");
    assert_eq!(exception.worker_name, "w1");
}

#[test]
fn handler_failure_reraises_in_inline_mode() {
    let engine = test_engine();
    engine.set_inline_mode(true);

    let err = factory::perform_later(&engine, "boom_job", vec![]).unwrap_err();
    match err {
        FactoryError::Work(WorkError::Perform(job_error)) => {
            assert_eq!(job_error.message, "boom");
        }
        other => panic!("expected re-raised perform error, got {other:?}"),
    }
}

#[test]
fn counts_by_state_reflects_job_documents() {
    let engine = test_engine();
    let worker = Worker::new("w1");

    factory::perform_later(&engine, "noop_job", vec![]).unwrap();
    factory::perform_later(&engine, "boom_job", vec![]).unwrap();
    let mut claimed = next_job(&engine, worker.name(), &[]).unwrap().unwrap();
    work(&engine, &mut claimed, &worker).unwrap();

    let counts = crate::job::counts_by_state(engine.store()).unwrap();
    assert_eq!(counts.get("completed"), Some(&1));
    assert_eq!(counts.get("queued"), Some(&1));
    assert_eq!(counts.values().sum::<u64>(), 2);
}

// ─── Ordering property ───

proptest! {
    /// Sequential claims drain the ready set in (priority asc, created_at
    /// asc) order regardless of insertion order.
    #[test]
    fn claims_drain_in_priority_order(priorities in prop::collection::vec(0i32..100, 1..12)) {
        let engine = test_engine();
        let base = Utc::now() - Duration::hours(1);

        let mut expected: Vec<(i32, i64, JobId)> = Vec::new();
        for (i, priority) in priorities.iter().enumerate() {
            let job = factory::later_with(&engine, "noop_job", "perform", vec![], |job| {
                job.priority = *priority;
                job.created_at = base + Duration::seconds(i as i64);
            })
            .unwrap();
            expected.push((*priority, i as i64, job.id));
        }
        expected.sort_by_key(|(priority, offset, _)| (*priority, *offset));

        let worker_name = WorkerName::new("w1");
        let mut claimed = Vec::new();
        while let Some(job) = next_job(&engine, &worker_name, &[]).unwrap() {
            claimed.push(job.id);
        }

        let expected_ids: Vec<JobId> = expected.into_iter().map(|(_, _, id)| id).collect();
        prop_assert_eq!(claimed, expected_ids);
    }
}

// Keep the collection name part of the public contract: hosts point ops
// tooling at it.
#[test]
fn jobs_collection_name_is_stable() {
    assert_eq!(JOBS_COLLECTION, "rocket_job.jobs");
}
