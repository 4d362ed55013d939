//! Reservation cascade
//!
//! Deleting a reservation that owns a queue closes the queue, issues a
//! local delete for every live resident job, and re-checks on a timer
//! until only history jobs remain. The reservation is purged then.

use batchdel_protocol::{ReasonCode, Reply};
use tracing::{debug, info, warn};

use crate::effects::{AccountKind, AccountRecord, HookEvent, HookVerdict};
use crate::error::DeleteError;
use crate::request::{DeleteFlags, RequestId, RequestKind};
use crate::server::Server;
use crate::state::ReservationState;
use crate::task::{Continuation, Owner, Trigger};

impl Server {
    /// Entry point for a delete-reservation request.
    pub(crate) fn delete_reservation(&mut self, req: RequestId) -> Result<(), DeleteError> {
        let Some(request) = self.request(req) else {
            return Ok(());
        };
        let resv_id = request.kind.target().to_string();
        let resv = self
            .store
            .reservation(&resv_id)
            .cloned()
            .ok_or_else(|| DeleteError::UnknownReservation(resv_id.clone()))?;
        self.authorize(&request, &resv.owner, &resv_id)?;

        if resv.state == ReservationState::BeingDeleted {
            debug!(resv_id = %resv_id, "reservation already draining");
            self.respond(req, Reply::Ack);
            return Ok(());
        }

        if let Some(submitter) = resv.submitter {
            let text = if resv.state == ReservationState::Unconfirmed {
                if resv.wait_expired {
                    format!("{} delete, wait period expired", resv_id)
                } else {
                    format!("{} DENIED", resv_id)
                }
            } else {
                format!("{} BEING DELETED", resv_id)
            };
            if let Some(r) = self.store.reservation_mut(&resv_id) {
                r.submitter = None;
            }
            self.respond(submitter, Reply::text(text));
        }

        let kind = if request.user == resv.owner_user() {
            AccountKind::ResvDeletedByClient
        } else {
            AccountKind::ResvDeletedByServer
        };
        self.effects.account(AccountRecord {
            kind,
            id: resv_id.clone(),
            text: format!("requestor={}", request.requester()),
        });
        if self.may_mail(&request) {
            self.effects.mail(
                &resv.owner,
                &resv_id,
                format!("Reservation deleted by {}", request.requester()),
            );
        }
        if resv.state != ReservationState::Unconfirmed {
            if let HookVerdict::Reject(message) = self.effects.run_hook(HookEvent::ResvEnd, &resv_id) {
                debug!(resv_id = %resv_id, message = %message, "end hook verdict ignored for delete");
            }
        }

        let residents = resv
            .owned_queue()
            .map(|q| self.store.jobs_in_queue(q))
            .unwrap_or_default();
        let Some(queue_name) = resv
            .owned_queue()
            .map(str::to_string)
            .filter(|_| !residents.is_empty())
        else {
            self.set_resv_state(&resv_id, ReservationState::BeingDeleted);
            self.respond(req, Reply::Ack);
            self.resv_purge(&resv_id);
            return Ok(());
        };

        if self.store.queue(&queue_name).is_some_and(|q| q.enabled) {
            let disable = RequestKind::ManageQueue {
                queue: queue_name.clone(),
                enabled: false,
                started: false,
            };
            if let Err(e) = self.issue_local(disable, &request.user, &request.host, &resv_id, None) {
                warn!(resv_id = %resv_id, queue = %queue_name, error = %e, "queue not disabled");
                return Err(e);
            }
        }
        self.set_resv_state(&resv_id, ReservationState::BeingDeleted);

        let mut issued = 0usize;
        let mut problems = 0usize;
        let mut live = 0usize;
        for job_id in &residents {
            let Some(job) = self.store.job(job_id) else {
                continue;
            };
            if job.state.is_history() {
                continue;
            }
            live += 1;
            let kind = RequestKind::DeleteJob {
                target: job_id.clone(),
            };
            match self.issue_local(kind, &request.user, &request.host, &resv_id, Some(job_id)) {
                Ok(_) => issued += 1,
                Err(e) => {
                    warn!(resv_id = %resv_id, job_id = %job_id, error = %e, "job delete not issued");
                    problems += 1;
                }
            }
        }
        if let Some(r) = self.store.reservation_mut(&resv_id) {
            r.down_counter = if live == 0 { 0 } else { residents.len() };
        }
        info!(resv_id = %resv_id, issued, problems, "reservation jobs deleting");

        if problems > 0 {
            self.respond(
                req,
                Reply::coded_text(
                    ReasonCode::ResvMessage,
                    format!("problem deleting jobs belonging to {}", resv_id),
                ),
            );
        } else {
            self.respond(req, Reply::Ack);
        }

        if live == 0 {
            self.resv_purge(&resv_id);
        } else {
            self.scheduler.register(
                Owner::Reservation(resv_id.clone()),
                Trigger::Immediate,
                Continuation::ResvRecheck { resv: resv_id },
            );
        }
        Ok(())
    }

    /// Issue a manager-privileged request to this server on behalf of a
    /// reservation; dispatch runs on the next scheduler pass.
    fn issue_local(
        &mut self,
        kind: RequestKind,
        user: &str,
        host: &str,
        resv_id: &str,
        job_id: Option<&str>,
    ) -> Result<RequestId, DeleteError> {
        let id = self.requests.issue_local(
            kind,
            user,
            host,
            DeleteFlags::default(),
            Some(resv_id.to_string()),
        )?;
        let owner = Owner::Reservation(resv_id.to_string());
        self.scheduler.register(
            owner.clone(),
            Trigger::RequestReply(id),
            Continuation::LocalReply {
                resv: Some(resv_id.to_string()),
                job: job_id.map(str::to_string),
            },
        );
        self.scheduler
            .register(owner, Trigger::Immediate, Continuation::Dispatch { request: id });
        Ok(id)
    }

    /// Timed drain check for a reservation being deleted.
    pub(crate) fn resv_recheck(&mut self, resv_id: &str) {
        let Some(resv) = self.store.reservation(resv_id) else {
            return;
        };
        let residents = resv
            .owned_queue()
            .map(|q| self.store.jobs_in_queue(q))
            .unwrap_or_default();
        let live = residents
            .iter()
            .filter_map(|id| self.store.job(id))
            .filter(|job| !job.state.is_history())
            .count();
        let down = if live == 0 { 0 } else { residents.len() };
        if let Some(r) = self.store.reservation_mut(resv_id) {
            r.down_counter = down;
        }

        if down == 0 {
            self.resv_purge(resv_id);
            return;
        }
        let interval = self.config.timers.resv_recheck_seconds;
        debug!(resv_id, live, down, interval, "reservation still draining");
        self.scheduler.register_after(
            Owner::Reservation(resv_id.to_string()),
            interval,
            Continuation::ResvRecheck {
                resv: resv_id.to_string(),
            },
        );
    }

    /// Remove a reservation, its queue and its remaining history jobs.
    pub(crate) fn resv_purge(&mut self, resv_id: &str) {
        let Some(resv) = self.store.purge_reservation(resv_id) else {
            return;
        };
        if let Some(queue) = resv.owned_queue() {
            for job_id in self.store.jobs_in_queue(queue) {
                self.purge_job_record(&job_id);
            }
            self.store.remove_queue(queue);
        }
        self.cancel_owner(Owner::Reservation(resv_id.to_string()));
        info!(resv_id, "reservation purged");
    }

    /// End of one occurrence of a standing reservation.
    pub(crate) fn occurrence_end(&mut self, req: RequestId) -> Result<(), DeleteError> {
        let Some(request) = self.request(req) else {
            return Ok(());
        };
        let resv_id = request.kind.target().to_string();
        if self.store.reservation(&resv_id).is_none() {
            return Err(DeleteError::UnknownReservation(resv_id));
        }
        match self.effects.run_hook(HookEvent::ResvOccurrenceEnd, &resv_id) {
            HookVerdict::Reject(message) => {
                info!(resv_id = %resv_id, message = %message, "occurrence end rejected by hook");
                self.respond(req, Reply::coded_text(ReasonCode::HookError, message));
            }
            HookVerdict::Accept => self.respond(req, Reply::Ack),
        }
        Ok(())
    }

    /// Change a queue's admission flags.
    pub(crate) fn manage_queue(&mut self, req: RequestId) -> Result<(), DeleteError> {
        let Some(request) = self.request(req) else {
            return Ok(());
        };
        let RequestKind::ManageQueue {
            queue,
            enabled,
            started,
        } = request.kind
        else {
            return Ok(());
        };
        let record = self
            .store
            .queue_mut(&queue)
            .ok_or_else(|| DeleteError::UnknownQueue(queue.clone()))?;
        record.enabled = enabled;
        record.started = started;
        info!(queue = %queue, enabled, started, "queue updated");
        self.respond(req, Reply::Ack);
        Ok(())
    }

    fn set_resv_state(&mut self, resv_id: &str, state: ReservationState) {
        if let Some(resv) = self.store.reservation_mut(resv_id) {
            debug!(resv_id, from = %resv.state, to = %state, "reservation state");
            resv.state = state;
        }
    }
}
