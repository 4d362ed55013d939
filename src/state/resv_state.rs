//! Reservation state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reservation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    /// Submitted, not yet confirmed by the scheduler
    Unconfirmed,
    Confirmed,
    Running,
    /// Cascade deletion in progress
    BeingDeleted,
}

impl ReservationState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: ReservationState) -> bool {
        use ReservationState::*;
        match (self, target) {
            (Unconfirmed, Confirmed) => true,
            (Confirmed, Running) => true,
            (Running, Confirmed) => true, // next occurrence of a standing reservation
            (BeingDeleted, _) => false,
            (_, BeingDeleted) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Unconfirmed => "unconfirmed",
            ReservationState::Confirmed => "confirmed",
            ReservationState::Running => "running",
            ReservationState::BeingDeleted => "being_deleted",
        }
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
