//! The job lifecycle state machine.
//!
//! Pure transition logic: given the current state and an event, compute the
//! next state or reject the event. Persistence of the post-image is the
//! caller's concern (the entity operations in [`super::job`]).
//!
//! ```text
//! queued --start--> running --complete--> completed
//!                      \----fail--------> failed
//! ```
//!
//! Terminal states never transition back.

use serde::{Deserialize, Serialize};

use crate::error::InvalidTransition;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed by a worker.
    Queued,

    /// Claimed; a worker is executing it.
    Running,

    /// Finished successfully. Terminal.
    Completed,

    /// Finished with a captured exception. Terminal.
    Failed,
}

impl JobState {
    /// The persisted (snake_case) name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Completed and failed jobs never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Sub-state marker on a running job.
///
/// `Processing` indicates a running batch job that still has claimable work,
/// so the dispatcher may hand it to additional workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubState {
    Processing,
}

/// Events accepted by the job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Start,
    Complete,
    Fail,
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Start => "start",
            JobEvent::Complete => "complete",
            JobEvent::Fail => "fail",
        }
    }
}

/// Computes the next state for an event, or rejects it.
pub fn next_state(current: JobState, event: JobEvent) -> Result<JobState, InvalidTransition> {
    match (current, event) {
        (JobState::Queued, JobEvent::Start) => Ok(JobState::Running),
        (JobState::Running, JobEvent::Complete) => Ok(JobState::Completed),
        (JobState::Running, JobEvent::Fail) => Ok(JobState::Failed),
        (from, event) => Err(InvalidTransition {
            from: from.name(),
            event: event.name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn happy_path_sequence() {
        let running = next_state(JobState::Queued, JobEvent::Start).unwrap();
        assert_eq!(running, JobState::Running);
        let done = next_state(running, JobEvent::Complete).unwrap();
        assert_eq!(done, JobState::Completed);
    }

    #[test]
    fn failure_sequence() {
        let running = next_state(JobState::Queued, JobEvent::Start).unwrap();
        assert_eq!(next_state(running, JobEvent::Fail).unwrap(), JobState::Failed);
    }

    #[test]
    fn complete_from_queued_is_rejected() {
        let err = next_state(JobState::Queued, JobEvent::Complete).unwrap_err();
        assert_eq!(err.from, "queued");
        assert_eq!(err.event, "complete");
    }

    #[test]
    fn serde_uses_snake_case_names() {
        assert_eq!(serde_json::to_string(&JobState::Queued).unwrap(), r#""queued""#);
        assert_eq!(
            serde_json::to_string(&SubState::Processing).unwrap(),
            r#""processing""#
        );
    }

    proptest! {
        /// Terminal states reject every event.
        #[test]
        fn terminal_states_accept_no_event(event_idx in 0usize..3) {
            let event = [JobEvent::Start, JobEvent::Complete, JobEvent::Fail][event_idx];
            for state in [JobState::Completed, JobState::Failed] {
                prop_assert!(next_state(state, event).is_err());
            }
        }

        /// Any reachable state sequence is a prefix of queued -> running -> terminal.
        #[test]
        fn sequences_are_prefixes_of_the_lifecycle(events in prop::collection::vec(0usize..3, 0..6)) {
            let mut state = JobState::Queued;
            let mut seen = vec![state];
            for idx in events {
                let event = [JobEvent::Start, JobEvent::Complete, JobEvent::Fail][idx];
                if let Ok(next) = next_state(state, event) {
                    state = next;
                    seen.push(state);
                }
            }
            let names: Vec<_> = seen.iter().map(|s| s.name()).collect();
            prop_assert!(
                names == ["queued"]
                    || names == ["queued", "running"]
                    || names == ["queued", "running", "completed"]
                    || names == ["queued", "running", "failed"]
            );
        }
    }
}
