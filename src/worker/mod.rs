//! Job dispatch and execution.
//!
//! The worker host loop lives outside this crate; it provides a name and
//! repeatedly calls [`next_job`] then [`work`]. This module supplies both
//! halves of that contract:
//!
//! - [`dispatch`]: the atomic claim (`next_job`)
//! - [`worker`]: per-claim execution (`work`, `call_method`)
//!
//! Killing a worker mid-`work` leaves its job `running` with a stale
//! `worker_name`; reaping such orphans is the host's concern.

pub mod dispatch;
pub mod worker;

#[cfg(test)]
mod tests;

pub use dispatch::{DispatchError, next_job};
pub use worker::{CallOptions, HookEvent, WorkError, Worker, call_method, work};
