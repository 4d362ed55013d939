//! Running-job termination protocol
//!
//! A live job is torn down according to where it is in its lifecycle:
//!
//! - transiting: the in-flight route is aborted and the delete is retried
//!   once the route exchange completes
//! - mid-launch (prerun): retried on a short timer until the agent accepts
//!   the job, unless forced
//! - running: the agent is signalled and the delete resumes on its reply;
//!   a forced delete by a manager finalizes at once
//! - anything else is aborted directly
//!
//! Every completed path writes one audit record and one reply.

use batchdel_jobid::JobId;
use batchdel_protocol::{AuxCode, ReasonCode, Reply, SignalReply, SignalRequest, KILL_EXIT_STATUS};
use tracing::{debug, error, info, warn};

use crate::error::DeleteError;
use crate::request::RequestId;
use crate::server::Server;
use crate::state::{JobState, JobSubstate};
use crate::store::{Job, ResourceHold};
use crate::task::{Continuation, Owner, Trigger};
use crate::transport::TransportError;

impl Server {
    /// Terminate one live job on behalf of `req`.
    ///
    /// Errors are returned only before anything was answered. Once set,
    /// `termination_in_progress` stays set; it blocks other non-forced
    /// deletes while the request that set it is outstanding.
    pub(crate) fn terminate(&mut self, req: RequestId, job_id: &str) -> Result<(), DeleteError> {
        let Some(request) = self.request(req) else {
            return Ok(());
        };
        let force = request.flags.force;
        let manager = request.perm.manager;
        let job = self
            .store
            .job(job_id)
            .cloned()
            .ok_or_else(|| DeleteError::UnknownJob(job_id.to_string()))?;

        if job.signal_exchange.is_some() && !force {
            return Err(DeleteError::bad_state(job_id, job.state, "signal already outstanding"));
        }
        if job.substate == JobSubstate::Provisioning && !force {
            return Err(DeleteError::bad_state(job_id, job.state, job.substate));
        }
        if job.state == JobState::Transiting && job.substate == JobSubstate::Abort {
            return self.await_route_abort(req, &job, request.flags.purge_history);
        }
        if job.termination_in_progress && !force {
            let holder = job
                .termination_request
                .filter(|holder| *holder != req && self.requests.contains(*holder));
            if let Some(holder) = holder {
                debug!(job_id, request_id = %req, holder = %holder, "termination already in progress");
                return Err(DeleteError::bad_state(job_id, job.state, "termination already in progress"));
            }
        }
        if let Some(record) = self.store.job_mut(job_id) {
            record.termination_in_progress = true;
            record.termination_request = Some(req);
            if request.flags.purge_history {
                record.purge_history_on_finish = true;
            }
        }

        if job.state == JobState::Transiting {
            return self.abort_transit(req, &job);
        }

        if job.substate == JobSubstate::Prerun && !force {
            let retry = self.config.timers.prerun_retry_seconds;
            self.scheduler.register_after(
                Owner::Job(job_id.to_string()),
                retry,
                Continuation::RetryDelete {
                    request: req,
                    job: job_id.to_string(),
                },
            );
            info!(job_id, request_id = %req, retry, "job still launching, delete retried later");
            return Ok(());
        }

        if force {
            if let Some(record) = self.store.job_mut(job_id) {
                record.exit_status = Some(KILL_EXIT_STATUS);
            }
        }

        if job.state == JobState::Running || job.substate == JobSubstate::Term {
            return self.terminate_running(req, &job, force, manager);
        }

        let mut abort = true;
        if job.flags.checkpoint {
            // Restart file at the agent: normal end-of-job processing.
            self.set_job_state(job_id, JobState::Exiting, JobSubstate::Exiting);
            self.scheduler.register(
                Owner::Job(job_id.to_string()),
                Trigger::Immediate,
                Continuation::JobExit {
                    job: job_id.to_string(),
                },
            );
            abort = false;
        } else if job.flags.staged_in {
            if let Err(e) = self.agent.remove_staged_files(job_id) {
                warn!(job_id, error = %e, "staged-in files not removed");
            }
        }

        self.audit_delete(job_id, Some(&job.owner), &request, true);

        if job.is_array_parent() && !force {
            self.check_array_doneness(job_id);
        } else if abort {
            if job.state == JobState::Exiting {
                self.agent.discard_job(job_id);
            }
            self.store.release_resources(job_id);
            self.finalize_job(job_id);
        }
        self.respond(req, Reply::Ack);
        Ok(())
    }

    fn abort_transit(&mut self, req: RequestId, job: &Job) -> Result<(), DeleteError> {
        let Some(exchange) = job.transit_exchange else {
            error!(job_id = %job.id, "transiting job has no route exchange");
            return Err(DeleteError::MissingExchange(job.id.clone()));
        };
        match self.agent.abort_route(&job.id) {
            Ok(()) => {}
            Err(TransportError::NoExchange(_)) => {
                error!(job_id = %job.id, %exchange, "agent has no route for transiting job");
                return Err(DeleteError::MissingExchange(job.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        self.scheduler.register(
            Owner::Job(job.id.clone()),
            Trigger::Exchange(exchange),
            Continuation::RouteDone {
                job: job.id.clone(),
                request: Some(req),
            },
        );
        if let Some(record) = self.store.job_mut(&job.id) {
            record.substate = JobSubstate::Abort;
        }
        info!(job_id = %job.id, %exchange, "route aborted for delete");
        Ok(())
    }

    /// Join a route abort another delete already started.
    fn await_route_abort(&mut self, req: RequestId, job: &Job, purge_history: bool) -> Result<(), DeleteError> {
        let Some(exchange) = job.transit_exchange else {
            error!(job_id = %job.id, "aborting job has no route exchange");
            return Err(DeleteError::MissingExchange(job.id.clone()));
        };
        if purge_history {
            if let Some(record) = self.store.job_mut(&job.id) {
                record.purge_history_on_finish = true;
            }
        }
        self.scheduler.register(
            Owner::Job(job.id.clone()),
            Trigger::Exchange(exchange),
            Continuation::RouteDone {
                job: job.id.clone(),
                request: Some(req),
            },
        );
        info!(job_id = %job.id, request_id = %req, %exchange, "delete waiting on route abort");
        Ok(())
    }

    fn terminate_running(
        &mut self,
        req: RequestId,
        job: &Job,
        force: bool,
        manager: bool,
    ) -> Result<(), DeleteError> {
        let Some(request) = self.request(req) else {
            return Ok(());
        };
        let job_id = job.id.as_str();

        if job.substate == JobSubstate::Rerun {
            self.set_job_state(job_id, JobState::Running, JobSubstate::Running);
            if let Some(record) = self.store.job_mut(job_id) {
                record.termination_in_progress = false;
                record.termination_request = None;
            }
            info!(job_id, "deleting instead of rerunning");
            self.audit_delete(job_id, Some(&job.owner), &request, true);
            self.respond(req, Reply::Ack);
            return Ok(());
        }

        if job.substate.is_suspended() && job.resources == ResourceHold::Released {
            if let Some(record) = self.store.job_mut(job_id) {
                record.resources = ResourceHold::Held;
            }
            debug!(job_id, "resources re-assigned to suspended job");
        }

        if job.substate == JobSubstate::Provisioning {
            info!(job_id, "deleting provisioning job");
            self.audit_delete(job_id, Some(&job.owner), &request, true);
            self.respond(req, Reply::Ack);
            self.store.release_resources(job_id);
            self.finalize_job(job_id);
            return Ok(());
        }

        let signal = if force {
            self.config.signals.kill.clone()
        } else {
            self.config.signals.terminate.clone()
        };
        let waiter = if manager && force { None } else { Some(req) };
        let sent = self.send_signal(job_id, &signal, waiter, 0);

        if force && (sent.is_err() || manager) {
            self.set_job_state(job_id, JobState::Exiting, JobSubstate::Exited);
            if !job.flags.local {
                self.track_remote(job_id);
            }
            info!(job_id, signal = %signal, "delete forced");
            self.audit_delete(job_id, Some(&job.owner), &request, true);
            self.respond(req, Reply::Ack);
            self.agent.discard_job(job_id);
            self.store.release_resources(job_id);
            self.finalize_job(job_id);
            return Ok(());
        }

        if let Err(e) = sent {
            warn!(job_id, signal = %signal, error = %e, "delete failed");
            return Err(e.into());
        }

        if let Some(record) = self.store.job_mut(job_id) {
            record.comment = Some(format!("Job deleted by {}", request.requester()));
        }
        info!(job_id, signal = %signal, "delete signal sent");
        Ok(())
    }

    /// Signal a job and register the continuation for the agent's answer.
    fn send_signal(
        &mut self,
        job_id: &str,
        signal: &str,
        waiter: Option<RequestId>,
        tries: u8,
    ) -> Result<(), TransportError> {
        let exchange = self
            .agent
            .issue_signal(&SignalRequest::new(job_id, signal))?;
        if let Some(record) = self.store.job_mut(job_id) {
            record.signal_exchange = Some(exchange);
        }
        self.scheduler.register(
            Owner::Job(job_id.to_string()),
            Trigger::Exchange(exchange),
            Continuation::SignalReply {
                job: job_id.to_string(),
                request: waiter,
                signal: signal.to_string(),
                tries,
            },
        );
        Ok(())
    }

    fn track_remote(&mut self, job_id: &str) {
        let Some(server) = JobId::parse(job_id).ok().and_then(|id| id.server) else {
            return;
        };
        if let Err(e) = self.peers.issue_track(&server, job_id, JobState::Exiting) {
            warn!(job_id, server = %server, error = %e, "tracking update not sent");
        }
    }

    /// Resume a delete once the agent answered its signal.
    pub(crate) fn on_signal_reply(
        &mut self,
        job_id: &str,
        waiter: Option<RequestId>,
        signal: &str,
        mut tries: u8,
        reply: SignalReply,
    ) {
        if let Some(record) = self.store.job_mut(job_id) {
            record.signal_exchange = None;
        }
        let Some(req) = waiter else {
            debug!(job_id, signal, "agent reply after forced delete ignored");
            return;
        };
        let Some(request) = self.request(req) else {
            return;
        };
        let Some(job) = self.store.job(job_id).cloned() else {
            self.reject(req, &DeleteError::UnknownJob(job_id.to_string()));
            return;
        };

        let mut code = reply.code;
        let mut signal = signal.to_string();
        loop {
            let Some(rejected) = code else {
                self.audit_delete(job_id, Some(&job.owner), &request, true);
                self.respond(req, Reply::Ack);
                if reply.aux == AuxCode::TerminateScript && !job.state.is_history() {
                    // Site terminate action running; its completion is reported as an exit.
                    self.set_job_state(job_id, JobState::Exiting, JobSubstate::ScriptTerm);
                }
                return;
            };
            info!(job_id, signal = %signal, code = %rejected, "agent rejected signal during delete");

            match rejected {
                ReasonCode::UnknownSignal if tries == 0 => {
                    tries += 1;
                    signal = self.config.signals.fallback.clone();
                    match self.send_signal(job_id, &signal, Some(req), tries) {
                        Ok(()) => return,
                        Err(e) => code = Some(e.code()),
                    }
                }
                ReasonCode::UnknownJobId if job.substate == JobSubstate::Prerun => {
                    // The agent may not have registered a job it is about to start.
                    self.reject_signal(req, job_id, &signal, rejected);
                    return;
                }
                ReasonCode::UnknownJobId => {
                    self.audit_delete(job_id, Some(&job.owner), &request, true);
                    self.store.release_resources(job_id);
                    self.respond(req, Reply::Ack);
                    self.finalize_job(job_id);
                    return;
                }
                other => {
                    self.reject_signal(req, job_id, &signal, other);
                    return;
                }
            }
        }
    }

    fn reject_signal(&mut self, req: RequestId, job_id: &str, signal: &str, code: ReasonCode) {
        let err = DeleteError::AgentRejected {
            job: job_id.to_string(),
            signal: signal.to_string(),
            code,
        };
        self.reject(req, &err);
    }

    /// End-of-job processing: keep the job as history or purge it.
    ///
    /// Subjobs update their parent's table and trigger a doneness check.
    pub(crate) fn finalize_job(&mut self, job_id: &str) {
        let Some(job) = self.store.job(job_id).cloned() else {
            debug!(job_id, "finalize of unknown job");
            return;
        };
        if job.state.is_history() {
            return;
        }
        let purge = job.purge_history_on_finish || !self.config.keep_history;
        self.store.release_resources(job_id);
        if let Some(record) = self.store.job_mut(job_id) {
            record.signal_exchange = None;
        }

        if let (Some(parent), Some(index)) = (job.parent.as_deref(), job.index) {
            let substate = if job.termination_in_progress {
                JobSubstate::Terminated
            } else {
                JobSubstate::Finished
            };
            if purge {
                self.purge_job_record(job_id);
            } else if let Some(record) = self.store.job_mut(job_id) {
                record.set_state(JobState::Expired, substate);
            }
            self.set_entry(parent, index, JobState::Expired, substate);
            info!(job_id, purge, "subjob finished");
            self.check_array_doneness(parent);
            return;
        }

        if purge {
            if let Some(array) = &job.array {
                for entry in array.entries() {
                    self.purge_job_record(&super::subjob_id(job_id, entry.index));
                }
            }
            self.purge_job_record(job_id);
        } else if let Some(record) = self.store.job_mut(job_id) {
            record.set_state(JobState::Finished, JobSubstate::Finished);
        }
        info!(job_id, purge, "job finished");
    }
}
