//! Reservation and queue records.

use serde::{Deserialize, Serialize};

use crate::request::RequestId;
use crate::state::ReservationState;

/// Reservation flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    /// Reservation made for a single job; owns no queue.
    Plain,
    /// Resource reservation with its own queue of jobs.
    ResourceWithQueue,
}

/// A reservation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    /// `user@host`
    pub owner: String,
    pub kind: ReservationKind,
    pub state: ReservationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Resident job count; zero once only history remains.
    pub down_counter: usize,
    /// Submitter waiting for a status reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<RequestId>,
    /// The submitter's wait deadline triggered this delete.
    #[serde(default)]
    pub wait_expired: bool,
}

impl Reservation {
    pub fn new(id: impl Into<String>, owner: impl Into<String>, state: ReservationState) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            kind: ReservationKind::Plain,
            state,
            queue: None,
            down_counter: 0,
            submitter: None,
            wait_expired: false,
        }
    }

    /// Attach a queue, making this a resource reservation.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.kind = ReservationKind::ResourceWithQueue;
        self.queue = Some(queue.into());
        self
    }

    /// The queue whose jobs belong to this reservation, if it owns one.
    pub fn owned_queue(&self) -> Option<&str> {
        match self.kind {
            ReservationKind::ResourceWithQueue => self.queue.as_deref(),
            ReservationKind::Plain => None,
        }
    }

    pub fn owner_user(&self) -> &str {
        self.owner.split('@').next().unwrap_or_default()
    }
}

/// A job queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    /// Accepting new jobs.
    pub enabled: bool,
    /// Eligible for scheduling.
    pub started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<String>,
}

impl Queue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            started: true,
            reservation: None,
        }
    }

    pub fn for_reservation(name: impl Into<String>, reservation: impl Into<String>) -> Self {
        Self {
            reservation: Some(reservation.into()),
            ..Self::new(name)
        }
    }
}
