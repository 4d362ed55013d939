//! Shared fixtures for integration tests.
//!
//! A [`Harness`] wires a server to the simulated agent, recording peers and
//! recording side-effect sinks, and keeps handles to all of them.

#![allow(dead_code)]

use batchdel::config::DeleteConfig;
use batchdel::effects::Recorder;
use batchdel::request::{NewRequest, Permission, RequestKind};
use batchdel::state::{JobState, JobSubstate, ReservationState};
use batchdel::store::{ArrayTracking, Job, MemoryStore, Queue, Reservation, SubjobEntry};
use batchdel::transport::{AgentLink, RecordingPeers};
use batchdel::{RequestId, Server};
use batchdel_agent::MockAgent;
use batchdel_protocol::Reply;

pub const SERVER: &str = "batchsrv";

pub fn manager() -> Permission {
    Permission::manager()
}

pub fn operator() -> Permission {
    Permission {
        manager: false,
        operator: true,
    }
}

/// Server plus handles to its collaborators.
pub struct Harness {
    pub server: Server,
    pub agent: MockAgent,
    pub peers: RecordingPeers,
    pub recorder: Recorder,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MockAgent::new(), DeleteConfig::default())
    }

    pub fn with_config(config: DeleteConfig) -> Self {
        Self::build(MockAgent::new(), config)
    }

    pub fn with_agent(agent: MockAgent) -> Self {
        Self::build(agent, DeleteConfig::default())
    }

    pub fn build(agent: MockAgent, config: DeleteConfig) -> Self {
        let peers = RecordingPeers::new();
        let recorder = Recorder::new();
        let server = Server::new(
            config,
            Box::new(MemoryStore::new()),
            Box::new(AgentLink::new(agent.clone())),
            Box::new(peers.clone()),
            recorder.effects(),
        );
        Self {
            server,
            agent,
            peers,
            recorder,
        }
    }

    // -------------------------------------------------------------------------
    // Records
    // -------------------------------------------------------------------------

    /// Insert a job; running and exiting jobs are known to the agent.
    pub fn add_job(&mut self, job: Job) {
        if matches!(job.state, JobState::Running | JobState::Exiting) {
            self.agent.register_job(&job.id);
        }
        self.server.store_mut().insert_job(job).unwrap();
    }

    pub fn queued_job(&mut self, id: &str, owner: &str) {
        self.add_job(Job::new(id, owner, "workq"));
    }

    pub fn running_job(&mut self, id: &str, owner: &str) {
        self.add_job(Job::new(id, owner, "workq").with_state(JobState::Running, JobSubstate::Running));
    }

    /// Insert an array parent with every index queued.
    pub fn add_array(&mut self, id: &str, owner: &str, indices: impl IntoIterator<Item = u32>) {
        let parent = Job::array_parent(id, owner, "workq", ArrayTracking::new(indices))
            .with_state(JobState::Begun, JobSubstate::Running);
        self.server.store_mut().insert_job(parent).unwrap();
    }

    /// Set a subjob's table entry without materializing a record.
    pub fn set_entry(&mut self, parent: &str, index: u32, state: JobState, substate: JobSubstate) {
        let job = self.server.store_mut().job_mut(parent).unwrap();
        let array = job.array.as_mut().unwrap();
        let offset = array.offset_of(index).unwrap();
        array.set_entry(offset, state, substate);
    }

    /// Materialize a subjob record in `state` and mirror it in the table.
    pub fn add_subjob(&mut self, parent: &str, index: u32, state: JobState, substate: JobSubstate) {
        self.set_entry(parent, index, state, substate);
        let parent_job = self.server.store().job(parent).unwrap().clone();
        let id = parent.replacen("[]", &format!("[{}]", index), 1);
        self.add_job(Job::subjob(&parent_job, id, index).with_state(state, substate));
    }

    pub fn add_queue(&mut self, name: &str, reservation: Option<&str>) {
        let mut queue = Queue::new(name);
        queue.reservation = reservation.map(str::to_string);
        self.server.store_mut().insert_queue(queue).unwrap();
    }

    pub fn add_reservation(&mut self, id: &str, owner: &str, state: ReservationState, queue: Option<&str>) {
        let mut resv = Reservation::new(id, owner, state);
        if let Some(queue) = queue {
            resv = resv.with_queue(queue);
        }
        self.server.store_mut().insert_reservation(resv).unwrap();
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Submit without draining events.
    pub fn submit_delete(&mut self, target: &str, user: &str, perm: Permission, extension: Option<&str>) -> RequestId {
        let mut new = NewRequest::delete_job(target, user, "h1").with_perm(perm);
        if let Some(extension) = extension {
            new = new.with_extension(extension);
        }
        self.server.submit(new)
    }

    /// Submit a delete and run until idle.
    pub fn delete(&mut self, target: &str, user: &str) -> RequestId {
        self.delete_with(target, user, Permission::default(), None)
    }

    pub fn delete_with(&mut self, target: &str, user: &str, perm: Permission, extension: Option<&str>) -> RequestId {
        let id = self.submit_delete(target, user, perm, extension);
        self.server.run_until_idle();
        id
    }

    pub fn delete_reservation(&mut self, target: &str, user: &str, perm: Permission) -> RequestId {
        let id = self
            .server
            .submit(NewRequest::delete_reservation(target, user, "h1").with_perm(perm));
        self.server.run_until_idle();
        id
    }

    pub fn occurrence_end(&mut self, target: &str) -> RequestId {
        let kind = RequestKind::ResvOccurrenceEnd {
            target: target.to_string(),
        };
        let id = self.server.submit(NewRequest::new(kind, "root", SERVER).with_perm(manager()));
        self.server.run_until_idle();
        id
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn reply(&self, id: RequestId) -> Option<Reply> {
        self.server.reply_for(id).cloned()
    }

    pub fn job(&self, id: &str) -> Option<Job> {
        self.server.store().job(id).cloned()
    }

    pub fn entry(&self, parent: &str, index: u32) -> SubjobEntry {
        let job = self.server.store().job(parent).unwrap();
        let array = job.array.as_ref().unwrap();
        *array.entry(array.offset_of(index).unwrap()).unwrap()
    }

    pub fn array(&self, parent: &str) -> ArrayTracking {
        self.server.store().job(parent).unwrap().array.clone().unwrap()
    }
}
