//! Job, reservation and queue store
//!
//! The control plane acts on records through the [`Store`] trait, using
//! ids as handles and treating a missing record as an ordinary outcome.

mod array;
mod job;
mod memory;
mod reservation;

pub use array::{ArrayTracking, SubjobEntry};
pub use job::{Job, JobFlags, ResourceHold};
pub use memory::MemoryStore;
pub use reservation::{Queue, Reservation, ReservationKind};

use std::fmt;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} already exists")]
    Duplicate(String),

    #[error("array table is being iterated")]
    ArrayBusy,
}

/// Persistent record store.
pub trait Store: fmt::Debug {
    fn job(&self, id: &str) -> Option<&Job>;
    fn job_mut(&mut self, id: &str) -> Option<&mut Job>;
    fn insert_job(&mut self, job: Job) -> Result<(), StoreError>;
    /// Irrecoverably remove a job.
    fn purge_job(&mut self, id: &str) -> Option<Job>;
    fn job_ids(&self) -> Vec<String>;
    /// Ids of jobs resident in `queue`.
    fn jobs_in_queue(&self, queue: &str) -> Vec<String>;

    fn reservation(&self, id: &str) -> Option<&Reservation>;
    fn reservation_mut(&mut self, id: &str) -> Option<&mut Reservation>;
    fn insert_reservation(&mut self, reservation: Reservation) -> Result<(), StoreError>;
    fn purge_reservation(&mut self, id: &str) -> Option<Reservation>;
    fn reservation_ids(&self) -> Vec<String>;

    fn queue(&self, name: &str) -> Option<&Queue>;
    fn queue_mut(&mut self, name: &str) -> Option<&mut Queue>;
    fn insert_queue(&mut self, queue: Queue) -> Result<(), StoreError>;
    fn remove_queue(&mut self, name: &str) -> Option<Queue>;

    /// Release a job's execution resources. Returns false if none were held.
    fn release_resources(&mut self, id: &str) -> bool {
        match self.job_mut(id) {
            Some(job) if job.resources != ResourceHold::None => {
                job.resources = ResourceHold::None;
                true
            }
            _ => false,
        }
    }

    /// Offset of subjob `index` in the table of array `parent`.
    fn subjob_offset(&self, parent: &str, index: u32) -> Option<usize> {
        self.job(parent)?.array.as_ref()?.offset_of(index)
    }
}
