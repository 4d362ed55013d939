//! Array deletes: whole array fan-out, single subjob, subjob range.
//!
//! Whole-array and range deletes walk the parent's table under its
//! iteration guard; a subjob finishing during the walk leaves the
//! doneness check to the walker, which runs it once the guard is down.

use batchdel_jobid::parse_index_ranges;
use batchdel_protocol::Reply;
use tracing::{debug, info, warn};

use super::subjob_id;
use crate::error::DeleteError;
use crate::request::{BatchRequest, RequestId};
use crate::server::Server;
use crate::state::{JobState, JobSubstate};
use crate::store::SubjobEntry;

impl Server {
    /// Delete every subjob of an array, then the parent.
    pub(crate) fn delete_array(
        &mut self,
        req: RequestId,
        request: &BatchRequest,
        parent_id: &str,
    ) -> Result<(), DeleteError> {
        let entries = self.begin_walk(parent_id)?;
        if request.flags.purge_history {
            if let Some(parent) = self.store.job_mut(parent_id) {
                parent.purge_history_on_finish = true;
            }
        }

        let mut branches = 0usize;
        for entry in entries {
            let sub_id = subjob_id(parent_id, entry.index);
            let Some(record) = self.store.job(&sub_id).cloned() else {
                if !entry.is_done() && !(entry.state == JobState::Exiting && !request.flags.force) {
                    self.set_entry(parent_id, entry.index, JobState::Expired, JobSubstate::Terminated);
                }
                continue;
            };
            if record.state == JobState::Exiting && !request.flags.force {
                debug!(job_id = %sub_id, "exiting subjob left to finish");
                continue;
            }
            if record.state.is_history() {
                // Regardless of the purge flag, the parent is going away.
                self.purge_job_record(&sub_id);
                continue;
            }
            match self.requests.fan_out(req, &sub_id) {
                Ok(branch) => {
                    branches += 1;
                    if let Err(err) = self.terminate(branch, &sub_id) {
                        self.reject(branch, &err);
                    }
                }
                Err(e) => warn!(job_id = %sub_id, error = %e, "subjob delete not issued"),
            }
        }
        self.end_walk(parent_id);
        info!(job_id = parent_id, branches, "array delete walked");

        if self.requests.pending(req) == Some(1) {
            // Every branch already answered: finish the parent under this request.
            if self.store.job(parent_id).is_some() {
                return self.terminate(req, parent_id);
            }
            self.respond(req, Reply::Ack);
            return Ok(());
        }

        let owner = self.store.job(parent_id).map(|p| p.owner.clone());
        self.audit_delete(parent_id, owner.as_deref(), request, true);
        self.release(req);
        self.check_array_doneness(parent_id);
        Ok(())
    }

    /// Delete one subjob named by index.
    pub(crate) fn delete_subjob(
        &mut self,
        req: RequestId,
        request: &BatchRequest,
        parent_id: &str,
        index: u32,
    ) -> Result<(), DeleteError> {
        let sub_id = subjob_id(parent_id, index);
        let entry = self
            .store
            .subjob_offset(parent_id, index)
            .and_then(|offset| {
                let array = self.store.job(parent_id)?.array.as_ref()?;
                array.entry(offset).copied()
            })
            .ok_or_else(|| DeleteError::UnknownJob(sub_id.clone()))?;

        if entry.state == JobState::Exiting && !request.flags.force {
            return Err(DeleteError::bad_state(&sub_id, entry.state, entry.substate));
        }
        if entry.state == JobState::Expired {
            return Err(DeleteError::NoHistoryForSubjob(sub_id));
        }

        if self.store.job(&sub_id).is_some() {
            return self.terminate(req, &sub_id);
        }

        let owner = self.store.job(parent_id).map(|p| p.owner.clone());
        self.audit_delete(&sub_id, owner.as_deref(), request, true);
        self.set_entry(parent_id, index, JobState::Expired, JobSubstate::Terminated);
        self.respond(req, Reply::Ack);
        self.check_array_doneness(parent_id);
        Ok(())
    }

    /// Delete every subjob whose index falls in `spec`.
    ///
    /// The whole range is validated before any entry is touched. Owner mail
    /// goes out once for the batch.
    pub(crate) fn delete_range(
        &mut self,
        req: RequestId,
        request: &BatchRequest,
        parent_id: &str,
        spec: &str,
    ) -> Result<(), DeleteError> {
        let ranges = parse_index_ranges(spec)?;
        let (max, owner) = self
            .store
            .job(parent_id)
            .and_then(|p| p.array.as_ref().map(|a| (a.max_index(), p.owner.clone())))
            .ok_or_else(|| DeleteError::UnknownJob(parent_id.to_string()))?;
        let max = max.unwrap_or_default();
        if let Some(range) = ranges.iter().find(|r| r.start > max) {
            return Err(DeleteError::IndexOutOfRange {
                index: range.start,
                max,
            });
        }

        let entries = self.begin_walk(parent_id)?;
        let force = request.flags.force;
        let mut touched = 0usize;
        for entry in entries
            .into_iter()
            .filter(|e| ranges.iter().any(|r| r.contains(e.index)))
        {
            if entry.is_done() {
                continue;
            }
            let sub_id = subjob_id(parent_id, entry.index);
            let record = self.store.job(&sub_id).cloned();
            let state = record.as_ref().map_or(entry.state, |r| r.state);
            if state == JobState::Exiting && !force {
                debug!(job_id = %sub_id, "exiting subjob skipped");
                continue;
            }

            if let Some(record) = record {
                if record.state == JobState::Running {
                    match self.requests.fan_out(req, &sub_id) {
                        Ok(branch) => {
                            touched += 1;
                            if let Err(err) = self.terminate(branch, &sub_id) {
                                self.reject(branch, &err);
                            }
                        }
                        Err(e) => warn!(job_id = %sub_id, error = %e, "subjob delete not issued"),
                    }
                    continue;
                }
                if record.state == JobState::Exiting {
                    self.agent.discard_job(&sub_id);
                    self.store.release_resources(&sub_id);
                }
                self.purge_job_record(&sub_id);
            }

            self.set_entry(parent_id, entry.index, JobState::Expired, JobSubstate::Terminated);
            self.audit_delete(&sub_id, None, request, false);
            touched += 1;
        }
        self.end_walk(parent_id);
        info!(job_id = parent_id, range = spec, touched, "subjob range deleted");

        if touched > 0 && self.may_mail(request) {
            self.effects.mail(
                &owner,
                parent_id,
                format!("Subjobs [{}] deleted by {}", spec, request.requester()),
            );
        }
        self.respond(req, Reply::Ack);
        self.check_array_doneness(parent_id);
        Ok(())
    }

    /// Finish an array parent once every subjob is done.
    pub(crate) fn check_array_doneness(&mut self, parent_id: &str) {
        let Some(parent) = self.store.job(parent_id) else {
            return;
        };
        let Some(array) = parent.array.as_ref() else {
            return;
        };
        if array.is_guarded() || !array.is_done() || parent.state.is_history() {
            return;
        }
        debug!(job_id = parent_id, total = array.total_count(), "every subjob done");
        self.finalize_job(parent_id);
    }

    /// Raise the array's iteration guard and snapshot its entries.
    fn begin_walk(&mut self, parent_id: &str) -> Result<Vec<SubjobEntry>, DeleteError> {
        let array = self
            .store
            .job_mut(parent_id)
            .and_then(|p| p.array.as_mut())
            .ok_or_else(|| DeleteError::UnknownJob(parent_id.to_string()))?;
        if array.begin_iteration().is_err() {
            return Err(DeleteError::ArrayBusy(parent_id.to_string()));
        }
        Ok(array.entries().to_vec())
    }

    fn end_walk(&mut self, parent_id: &str) {
        if let Some(array) = self.store.job_mut(parent_id).and_then(|p| p.array.as_mut()) {
            array.end_iteration();
        }
    }
}
