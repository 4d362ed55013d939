//! Deletion orchestrator
//!
//! A delete request is classified by the shape of its target id:
//!
//! | Shape | Example | Path |
//! |---|---|---|
//! | plain job | `12.svr` | history purge or termination |
//! | array parent | `12[].svr` | history purge or fan-out over every subjob |
//! | single subjob | `12[3].svr` | termination, or inline table update |
//! | subjob range | `12[1-9:2].svr` | batched per-subjob handling |
//!
//! Validation failures are returned as errors before any state changes;
//! the dispatcher turns them into the request's single rejection.

mod array;
mod history;
mod reservation;
mod terminate;

use batchdel_jobid::{IdShape, JobId};
use tracing::{debug, info};

use crate::effects::AccountRecord;
use crate::error::DeleteError;
use crate::request::{BatchRequest, RequestId};
use crate::server::Server;
use crate::state::JobState;
use crate::store::Job;
use crate::task::Owner;

/// Id of subjob `index` of the array whose parent id is `parent`.
pub(crate) fn subjob_id(parent: &str, index: u32) -> String {
    parent.replacen("[]", &format!("[{}]", index), 1)
}

impl Server {
    /// Entry point for a delete-job request.
    pub(crate) fn delete_job(&mut self, req: RequestId) -> Result<(), DeleteError> {
        let Some(request) = self.request(req) else {
            return Ok(());
        };
        let id = JobId::parse(request.kind.target())?.qualified(&self.config.server_name);
        debug!(request_id = %req, target = %id, shape = ?id.shape, "classified delete target");

        match id.shape.clone() {
            IdShape::Plain => {
                let job_id = id.plain_id();
                let Some(job) = self.store.job(&job_id).cloned() else {
                    if self.store.job(&id.parent_id()).is_some() {
                        return Err(DeleteError::invalid(&job_id, "names an array job without brackets"));
                    }
                    return Err(DeleteError::UnknownJob(job_id));
                };
                self.authorize(&request, &job.owner, &job_id)?;
                self.delete_whole(req, &request, job)
            }
            IdShape::ArrayParent => {
                let job_id = id.parent_id();
                let job = self
                    .store
                    .job(&job_id)
                    .cloned()
                    .ok_or_else(|| DeleteError::UnknownJob(job_id.clone()))?;
                self.authorize(&request, &job.owner, &job_id)?;
                self.delete_whole(req, &request, job)
            }
            IdShape::SingleSubjob(index) => {
                let parent = self.array_parent_of(&id, &request)?;
                self.delete_subjob(req, &request, &parent.id, index)
            }
            IdShape::SubjobRange(spec) => {
                let parent = self.array_parent_of(&id, &request)?;
                self.delete_range(req, &request, &parent.id, &spec)
            }
        }
    }

    /// Resolve and check the parent of a subjob-form id.
    fn array_parent_of(&self, id: &JobId, request: &BatchRequest) -> Result<Job, DeleteError> {
        let parent_id = id.parent_id();
        let Some(parent) = self.store.job(&parent_id).filter(|p| p.is_array_parent()) else {
            if self.store.job(&id.plain_id()).is_some() {
                return Err(DeleteError::invalid(&id.to_string(), "job is not an array"));
            }
            return Err(DeleteError::UnknownJob(id.to_string()));
        };
        self.authorize(request, &parent.owner, &parent_id)?;

        if parent.state.is_history() {
            return Err(if request.flags.purge_history {
                DeleteError::NoHistoryForSubjob(id.to_string())
            } else {
                DeleteError::HistoryJob(parent_id)
            });
        }
        Ok(parent.clone())
    }

    /// Owners may delete their own work; managers and operators anything.
    fn authorize(&self, request: &BatchRequest, owner: &str, target: &str) -> Result<(), DeleteError> {
        let owner_user = owner.split('@').next().unwrap_or_default();
        if request.perm.is_privileged() || request.user == owner_user {
            return Ok(());
        }
        Err(DeleteError::PermissionDenied {
            target: target.to_string(),
            user: request.requester(),
        })
    }

    /// A plain job or an array parent as a whole.
    fn delete_whole(&mut self, req: RequestId, request: &BatchRequest, job: Job) -> Result<(), DeleteError> {
        if job.state.is_history() {
            if request.flags.purge_history {
                return self.purge_history(req, request, &job.id);
            }
            if job.state == JobState::Moved {
                return self.forward_moved(req, &job);
            }
            return Err(DeleteError::HistoryJob(job.id));
        }

        if job.is_array_parent() {
            return self.delete_array(req, request, &job.id);
        }
        if job.state == JobState::Exiting && !request.flags.force {
            return Err(DeleteError::bad_state(&job.id, job.state, job.substate));
        }
        self.terminate(req, &job.id)
    }

    /// Whether a delete by `request` may notify owners at all.
    pub(crate) fn may_mail(&self, request: &BatchRequest) -> bool {
        self.config.mail_enabled && !request.flags.no_mail && !request.is_internal()
    }

    /// Write the "deleted" audit record and notify the owner.
    ///
    /// Mail goes out only when someone other than the owner deleted the job.
    pub(crate) fn audit_delete(&mut self, job_id: &str, owner: Option<&str>, request: &BatchRequest, mail: bool) {
        let requester = request.requester();
        self.effects
            .account(AccountRecord::job_deleted(job_id, &requester));
        info!(job_id, requester = %requester, "job deleted");

        let Some(owner) = owner else {
            return;
        };
        let owner_user = owner.split('@').next().unwrap_or_default();
        if mail && self.may_mail(request) && owner_user != request.user {
            self.effects
                .mail(owner, job_id, format!("Job deleted by {}", requester));
        }
    }

    /// Purge a record and everything scheduled on its behalf.
    pub(crate) fn purge_job_record(&mut self, job_id: &str) -> Option<Job> {
        let job = self.store.purge_job(job_id)?;
        info!(job_id, state = %job.state, "job purged");
        self.cancel_owner(Owner::Job(job_id.to_string()));
        Some(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjob_id() {
        assert_eq!(subjob_id("12[].svr", 3), "12[3].svr");
        assert_eq!(subjob_id("12[]", 0), "12[0]");
    }
}
