//! Deferred task facility
//!
//! Suspended work is registered as a typed [`Continuation`] together with
//! the [`Trigger`] that resumes it and the [`Owner`] whose lifetime bounds
//! it. The [`Scheduler`] hands ready continuations back one at a time in
//! arrival order; time is virtual and only moves through
//! [`Scheduler::advance`].

mod continuation;
mod scheduler;

pub use continuation::{Continuation, Owner, TaskEvent, Trigger};
pub use scheduler::{ReadyTask, Scheduler, TaskId};
