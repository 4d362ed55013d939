//! In-memory store.

use std::collections::BTreeMap;

use super::{Job, Queue, Reservation, Store, StoreError};

/// Store backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: BTreeMap<String, Job>,
    reservations: BTreeMap<String, Reservation>,
    queues: BTreeMap<String, Queue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    fn insert_job(&mut self, job: Job) -> Result<(), StoreError> {
        if self.jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn purge_job(&mut self, id: &str) -> Option<Job> {
        self.jobs.remove(id)
    }

    fn job_ids(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    fn jobs_in_queue(&self, queue: &str) -> Vec<String> {
        self.jobs
            .values()
            .filter(|job| job.queue == queue)
            .map(|job| job.id.clone())
            .collect()
    }

    fn reservation(&self, id: &str) -> Option<&Reservation> {
        self.reservations.get(id)
    }

    fn reservation_mut(&mut self, id: &str) -> Option<&mut Reservation> {
        self.reservations.get_mut(id)
    }

    fn insert_reservation(&mut self, reservation: Reservation) -> Result<(), StoreError> {
        if self.reservations.contains_key(&reservation.id) {
            return Err(StoreError::Duplicate(reservation.id));
        }
        self.reservations.insert(reservation.id.clone(), reservation);
        Ok(())
    }

    fn purge_reservation(&mut self, id: &str) -> Option<Reservation> {
        self.reservations.remove(id)
    }

    fn reservation_ids(&self) -> Vec<String> {
        self.reservations.keys().cloned().collect()
    }

    fn queue(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }

    fn queue_mut(&mut self, name: &str) -> Option<&mut Queue> {
        self.queues.get_mut(name)
    }

    fn insert_queue(&mut self, queue: Queue) -> Result<(), StoreError> {
        if self.queues.contains_key(&queue.name) {
            return Err(StoreError::Duplicate(queue.name));
        }
        self.queues.insert(queue.name.clone(), queue);
        Ok(())
    }

    fn remove_queue(&mut self, name: &str) -> Option<Queue> {
        self.queues.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{JobState, JobSubstate};
    use crate::store::ResourceHold;

    #[test]
    fn test_insert_and_purge_job() {
        let mut store = MemoryStore::new();
        store.insert_job(Job::new("1.svr", "alice@h", "workq")).unwrap();
        assert!(store.job("1.svr").is_some());
        assert_eq!(
            store.insert_job(Job::new("1.svr", "alice@h", "workq")),
            Err(StoreError::Duplicate("1.svr".to_string()))
        );

        let purged = store.purge_job("1.svr").unwrap();
        assert_eq!(purged.id, "1.svr");
        assert!(store.job("1.svr").is_none());
        assert!(store.purge_job("1.svr").is_none());
    }

    #[test]
    fn test_jobs_in_queue() {
        let mut store = MemoryStore::new();
        store.insert_job(Job::new("1.svr", "a@h", "R1")).unwrap();
        store.insert_job(Job::new("2.svr", "a@h", "workq")).unwrap();
        store.insert_job(Job::new("3.svr", "a@h", "R1")).unwrap();
        assert_eq!(store.jobs_in_queue("R1"), vec!["1.svr", "3.svr"]);
    }

    #[test]
    fn test_release_resources() {
        let mut store = MemoryStore::new();
        store
            .insert_job(
                Job::new("1.svr", "a@h", "q").with_state(JobState::Running, JobSubstate::Running),
            )
            .unwrap();
        assert!(store.release_resources("1.svr"));
        assert_eq!(store.job("1.svr").unwrap().resources, ResourceHold::None);
        assert!(!store.release_resources("1.svr"));
        assert!(!store.release_resources("missing"));
    }

    #[test]
    fn test_subjob_offset() {
        let mut store = MemoryStore::new();
        let array = crate::store::ArrayTracking::new([2, 4, 6]);
        store
            .insert_job(Job::array_parent("7[].svr", "a@h", "q", array))
            .unwrap();
        store.insert_job(Job::new("8.svr", "a@h", "q")).unwrap();

        assert_eq!(store.subjob_offset("7[].svr", 4), Some(1));
        assert_eq!(store.subjob_offset("7[].svr", 5), None);
        assert_eq!(store.subjob_offset("8.svr", 0), None);
        assert_eq!(store.subjob_offset("missing", 2), None);
    }
}
