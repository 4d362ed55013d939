//! History purge decision.

use batchdel_protocol::Reply;
use tracing::{info, warn};

use super::subjob_id;
use crate::error::DeleteError;
use crate::request::{BatchRequest, RequestId};
use crate::server::Server;
use crate::store::Job;

impl Server {
    /// Purge a job resting in history, bypassing termination.
    ///
    /// Archived subjobs of an array are purged with it. A moved job's
    /// history is also purged on the server it was moved to.
    pub(crate) fn purge_history(
        &mut self,
        req: RequestId,
        request: &BatchRequest,
        job_id: &str,
    ) -> Result<(), DeleteError> {
        let job = self
            .store
            .job(job_id)
            .cloned()
            .ok_or_else(|| DeleteError::UnknownJob(job_id.to_string()))?;
        info!(job_id, requester = %request.requester(), "history purge requested");

        if let Some(server) = job.moved_to_server() {
            if let Err(e) = self.peers.issue_delete(server, job_id, true) {
                warn!(job_id, server, error = %e, "remote history purge not sent");
            }
        }

        if let Some(array) = &job.array {
            for entry in array.entries() {
                let sub = subjob_id(job_id, entry.index);
                if self.store.job(&sub).is_some() {
                    self.purge_job_record(&sub);
                }
            }
        }
        self.purge_job_record(job_id);
        self.respond(req, Reply::HistoryPurged);
        Ok(())
    }

    /// Pass a delete for a moved job on to the server that now owns it.
    pub(crate) fn forward_moved(&mut self, req: RequestId, job: &Job) -> Result<(), DeleteError> {
        let server = job
            .moved_to_server()
            .ok_or_else(|| DeleteError::HistoryJob(job.id.clone()))?;
        self.peers.issue_delete(server, &job.id, false)?;
        info!(job_id = %job.id, server, "delete forwarded to new owner");
        self.respond(req, Reply::Ack);
        Ok(())
    }
}
