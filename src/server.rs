//! The deletion server
//!
//! Owns the store, the request table, the deferred task scheduler and the
//! transports. All orchestration runs on the caller's thread: requests are
//! dispatched on submit, and suspended work resumes from
//! [`Server::run_until_idle`] as agent events and timers arrive.

use batchdel_protocol::{AgentEvent, ExchangeId, Reply};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DeleteConfig;
use crate::effects::Effects;
use crate::error::DeleteError;
use crate::request::{
    BatchRequest, Delivery, NewRequest, RequestId, RequestKind, RequestOrigin, RequestTable,
};
use crate::state::{JobState, JobSubstate};
use crate::store::Store;
use crate::task::{Continuation, Owner, ReadyTask, Scheduler, TaskEvent, Trigger};
use crate::transport::{ExecutionAgent, PeerTransport};

/// A reply delivered to an external caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientReply {
    pub request: RequestId,
    pub target: String,
    pub reply: Reply,
}

/// The deletion control plane.
#[derive(Debug)]
pub struct Server {
    pub(crate) config: DeleteConfig,
    pub(crate) store: Box<dyn Store>,
    pub(crate) requests: RequestTable,
    pub(crate) scheduler: Scheduler,
    pub(crate) agent: Box<dyn ExecutionAgent>,
    pub(crate) peers: Box<dyn PeerTransport>,
    pub(crate) effects: Effects,
    replies: Vec<ClientReply>,
}

impl Server {
    pub fn new(
        config: DeleteConfig,
        store: Box<dyn Store>,
        agent: Box<dyn ExecutionAgent>,
        peers: Box<dyn PeerTransport>,
        effects: Effects,
    ) -> Self {
        Self {
            requests: RequestTable::new(config.max_local_requests),
            config,
            store,
            scheduler: Scheduler::starting_at(Utc::now()),
            agent,
            peers,
            effects,
            replies: Vec::new(),
        }
    }

    pub fn config(&self) -> &DeleteConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn Store {
        self.store.as_mut()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn requests(&self) -> &RequestTable {
        &self.requests
    }

    /// Accept a caller request and dispatch it.
    pub fn submit(&mut self, new: NewRequest) -> RequestId {
        let id = self.requests.ingress(new);
        if let Some(request) = self.requests.get(id) {
            info!(request_id = %id, target = request.kind.target(), requester = %request.requester(), "request received");
        }
        self.dispatch(id);
        id
    }

    /// Register a reservation submitter waiting for a status reply.
    pub fn attach_submitter(
        &mut self,
        resv_id: &str,
        user: &str,
        host: &str,
    ) -> Result<RequestId, DeleteError> {
        if self.store.reservation(resv_id).is_none() {
            return Err(DeleteError::UnknownReservation(resv_id.to_string()));
        }
        let id = self.requests.ingress(NewRequest::new(
            RequestKind::AwaitReservation {
                target: resv_id.to_string(),
            },
            user,
            host,
        ));
        if let Some(resv) = self.store.reservation_mut(resv_id) {
            resv.submitter = Some(id);
        }
        debug!(resv_id, request_id = %id, "submitter attached");
        Ok(id)
    }

    pub(crate) fn dispatch(&mut self, id: RequestId) {
        let Some(kind) = self.requests.get(id).map(|r| r.kind.clone()) else {
            return;
        };
        let result = match kind {
            RequestKind::DeleteJob { .. } => self.delete_job(id),
            RequestKind::DeleteReservation { .. } => self.delete_reservation(id),
            RequestKind::ResvOccurrenceEnd { .. } => self.occurrence_end(id),
            RequestKind::ManageQueue { .. } => self.manage_queue(id),
            RequestKind::AwaitReservation { .. } => Ok(()),
        };
        if let Err(err) = result {
            self.reject(id, &err);
        }
    }

    pub(crate) fn request(&self, id: RequestId) -> Option<BatchRequest> {
        self.requests.get(id).cloned()
    }

    /// Record a reply and drop the request's own hold.
    pub(crate) fn respond(&mut self, id: RequestId, reply: Reply) {
        if let Ok(Some(delivery)) = self.requests.respond(id, reply) {
            self.deliver(delivery);
        }
    }

    /// Drop one hold without a reply of its own.
    pub(crate) fn release(&mut self, id: RequestId) {
        match self.requests.release(id) {
            Ok(Some(delivery)) => self.deliver(delivery),
            Ok(None) => {}
            Err(e) => warn!(request_id = %id, error = %e, "release of unknown request"),
        }
    }

    pub(crate) fn reject(&mut self, id: RequestId, err: &DeleteError) {
        warn!(request_id = %id, code = %err.code(), class = ?err.class(), error = %err, "request rejected");
        self.respond(id, err.to_reply());
    }

    fn deliver(&mut self, delivery: Delivery) {
        match delivery.origin {
            RequestOrigin::Local { .. } => {
                debug!(request_id = %delivery.id, reply = %delivery.reply, "local reply");
                self.scheduler.on_request_reply(delivery.id, delivery.reply);
            }
            _ => {
                info!(request_id = %delivery.id, target = delivery.kind.target(), reply = %delivery.reply, "reply sent");
                self.replies.push(ClientReply {
                    request: delivery.id,
                    target: delivery.kind.target().to_string(),
                    reply: delivery.reply,
                });
            }
        }
    }

    /// Every reply sent to a caller, in order.
    pub fn replies(&self) -> &[ClientReply] {
        &self.replies
    }

    /// The reply sent for `id`, if any.
    pub fn reply_for(&self, id: RequestId) -> Option<&Reply> {
        self.replies.iter().find(|r| r.request == id).map(|r| &r.reply)
    }

    /// Number of replies sent for `id`.
    pub fn replies_for(&self, id: RequestId) -> usize {
        self.replies.iter().filter(|r| r.request == id).count()
    }

    /// Process agent events and ready tasks until nothing is left to do.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut steps = 0;
        loop {
            let events = self.agent.poll();
            let polled = !events.is_empty();
            for event in events {
                self.on_agent_event(event);
            }
            match self.scheduler.pop_ready() {
                Some(task) => {
                    self.run_task(task);
                    steps += 1;
                }
                None if !polled => break,
                None => {}
            }
        }
        steps
    }

    /// Move the virtual clock and run whatever became ready.
    pub fn advance(&mut self, seconds: u64) -> usize {
        self.scheduler.advance(seconds);
        self.run_until_idle()
    }

    fn on_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::SignalReply { exchange, reply } => {
                if self.scheduler.on_signal_reply(exchange, reply) == 0 {
                    debug!(%exchange, "signal reply with no waiter");
                }
            }
            AgentEvent::RouteDone {
                exchange,
                job_id,
                delivered,
            } => self.route_finished(&job_id, exchange, delivered),
            AgentEvent::JobExit { job_id, exit_status } => self.job_exited(&job_id, exit_status),
        }
    }

    fn run_task(&mut self, task: ReadyTask) {
        debug!(task = %task.id, owner = ?task.owner, task_kind = task.continuation.name(), "running task");
        match (task.continuation, task.event) {
            (Continuation::Dispatch { request }, _)
            | (Continuation::RetryDelete { request, .. }, _) => self.dispatch(request),
            (
                Continuation::RouteDone {
                    job,
                    request: Some(request),
                },
                _,
            ) => self.resume_after_route(&job, request),
            (Continuation::RouteDone { request: None, .. }, _) => {}
            (
                Continuation::SignalReply {
                    job,
                    request,
                    signal,
                    tries,
                },
                TaskEvent::Signal(reply),
            ) => self.on_signal_reply(&job, request, &signal, tries, reply),
            (Continuation::JobExit { job }, _) => self.finalize_job(&job),
            (Continuation::ResvRecheck { resv }, _) => self.resv_recheck(&resv),
            (Continuation::LocalReply { resv, job }, TaskEvent::Reply(reply)) => {
                if reply.is_reject() {
                    warn!(resv_id = ?resv, job_id = ?job, %reply, "local request failed");
                } else {
                    debug!(resv_id = ?resv, job_id = ?job, %reply, "local request done");
                }
            }
            (continuation, event) => {
                warn!(task_kind = continuation.name(), ?event, "task woken by unexpected event");
            }
        }
    }

    /// Retry a delete that waited on a route exchange.
    ///
    /// Several deletes may wait on one aborted route; the first to resume
    /// finishes the job and the rest are acknowledged.
    fn resume_after_route(&mut self, job_id: &str, request: RequestId) {
        let finished = self
            .store
            .job(job_id)
            .map_or(true, |job| matches!(job.state, JobState::Finished | JobState::Expired));
        if finished {
            debug!(job_id, request_id = %request, "job finished by an earlier delete");
            self.respond(request, Reply::Ack);
            return;
        }
        self.dispatch(request);
    }

    /// De-register an owner's tasks; requests they held are rejected.
    pub(crate) fn cancel_owner(&mut self, owner: Owner) {
        for continuation in self.scheduler.cancel_owner(&owner) {
            let Some(request) = continuation.request() else {
                continue;
            };
            if !self.requests.contains(request) {
                continue;
            }
            if matches!(continuation, Continuation::RouteDone { .. }) {
                // Another delete waiting on the same route purged the job.
                self.respond(request, Reply::Ack);
                continue;
            }
            let err = match &owner {
                Owner::Reservation(id) => DeleteError::UnknownReservation(id.clone()),
                Owner::Job(id) => DeleteError::UnknownJob(id.clone()),
                Owner::Server => DeleteError::UnknownJob(String::new()),
            };
            self.reject(request, &err);
        }
    }

    /// The agent acknowledged that a dispatched job started.
    pub fn job_started(&mut self, job_id: &str) -> Result<(), DeleteError> {
        let job = self
            .store
            .job(job_id)
            .ok_or_else(|| DeleteError::UnknownJob(job_id.to_string()))?;
        if job.substate != JobSubstate::Prerun {
            return Err(DeleteError::bad_state(job_id, job.state, job.substate));
        }
        self.set_job_state(job_id, JobState::Running, JobSubstate::Running);
        info!(job_id, "job started");
        Ok(())
    }

    /// Start routing a queued job to `destination` (`queue@server`).
    pub fn route_job(&mut self, job_id: &str, destination: &str) -> Result<ExchangeId, DeleteError> {
        if self.store.job(job_id).is_none() {
            return Err(DeleteError::UnknownJob(job_id.to_string()));
        }
        let exchange = self.agent.route_job(job_id, destination)?;
        if let Some(job) = self.store.job_mut(job_id) {
            job.set_state(JobState::Transiting, JobSubstate::Transit);
            job.transit_exchange = Some(exchange);
            job.destination = Some(destination.to_string());
        }
        info!(job_id, destination, %exchange, "job routing");
        Ok(exchange)
    }

    /// An in-flight route ended; resume anything waiting on it.
    pub fn route_finished(&mut self, job_id: &str, exchange: ExchangeId, delivered: bool) {
        if let Some(job) = self.store.job_mut(job_id) {
            if job.transit_exchange == Some(exchange) {
                job.transit_exchange = None;
                if delivered {
                    job.set_state(JobState::Moved, JobSubstate::Moved);
                } else {
                    job.set_state(JobState::Queued, JobSubstate::Queued);
                }
                info!(job_id, delivered, "route finished");
            }
        }
        self.scheduler.on_route_done(exchange, delivered);
    }

    /// The agent reported that a job's processes ended.
    pub fn job_exited(&mut self, job_id: &str, exit_status: i32) {
        let Some(job) = self.store.job_mut(job_id) else {
            debug!(job_id, "exit report for unknown job");
            return;
        };
        job.exit_status.get_or_insert(exit_status);
        debug!(job_id, exit_status, "job exit reported");
        self.scheduler.register(
            Owner::Job(job_id.to_string()),
            Trigger::Immediate,
            Continuation::JobExit {
                job: job_id.to_string(),
            },
        );
    }

    /// Update a job's state, mirroring it into its parent's array table.
    pub(crate) fn set_job_state(&mut self, job_id: &str, state: JobState, substate: JobSubstate) {
        let Some(job) = self.store.job_mut(job_id) else {
            return;
        };
        debug!(job_id, from = %job.state, to = %state, %substate, "job state");
        job.set_state(state, substate);
        let (parent, index) = (job.parent.clone(), job.index);
        if let (Some(parent), Some(index)) = (parent, index) {
            self.set_entry(&parent, index, state, substate);
        }
    }

    /// Update one entry of an array table.
    pub(crate) fn set_entry(&mut self, parent: &str, index: u32, state: JobState, substate: JobSubstate) {
        let Some(offset) = self.store.subjob_offset(parent, index) else {
            return;
        };
        if let Some(array) = self.store.job_mut(parent).and_then(|p| p.array.as_mut()) {
            array.set_entry(offset, state, substate);
        }
    }
}
