//! Lifecycle states for jobs and reservations
//!
//! - Job states: Queued/Held/Waiting → Running → Exiting → {Finished | Expired}
//!   with Transiting and Moved for routed jobs and Begun for array parents
//! - Reservation states: Unconfirmed → Confirmed → Running, any → BeingDeleted

mod job_state;
mod resv_state;

pub use job_state::{JobState, JobSubstate};
pub use resv_state::ReservationState;

/// A state after which no further transitions happen.
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
