//! Request table with pending-count completion.

use batchdel_protocol::Reply;
use std::collections::BTreeMap;
use tracing::{debug, error};

use super::{
    BatchRequest, DeleteFlags, NewRequest, Permission, RequestId, RequestKind, RequestOrigin,
};

/// Errors from request bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown request {0}")]
    Unknown(RequestId),

    #[error("local request limit of {0} reached")]
    LocalLimit(usize),
}

/// A reply leaving the table for a top-level request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: RequestId,
    pub origin: RequestOrigin,
    pub kind: RequestKind,
    pub reply: Reply,
}

/// Outstanding requests keyed by id.
#[derive(Debug)]
pub struct RequestTable {
    requests: BTreeMap<RequestId, BatchRequest>,
    next_id: u64,
    local_limit: usize,
}

impl RequestTable {
    pub fn new(local_limit: usize) -> Self {
        Self {
            requests: BTreeMap::new(),
            next_id: 0,
            local_limit,
        }
    }

    fn allocate(&mut self) -> RequestId {
        self.next_id += 1;
        RequestId(self.next_id)
    }

    fn insert(&mut self, request: BatchRequest) -> RequestId {
        let id = request.id;
        debug!(request_id = %id, target = request.kind.target(), origin = ?request.origin, "request created");
        self.requests.insert(id, request);
        id
    }

    /// Register a caller request with a pending count of one.
    pub fn ingress(&mut self, new: NewRequest) -> RequestId {
        let id = self.allocate();
        let flags = DeleteFlags::from_extension(new.extension.as_deref());
        self.insert(BatchRequest {
            id,
            kind: new.kind,
            user: new.user,
            host: new.host,
            perm: new.perm,
            flags,
            origin: RequestOrigin::Client,
            pending: 1,
            reply: None,
        })
    }

    /// Register a self-addressed request.
    pub fn issue_local(
        &mut self,
        kind: RequestKind,
        user: &str,
        host: &str,
        flags: DeleteFlags,
        reservation: Option<String>,
    ) -> Result<RequestId, RequestError> {
        if self.outstanding_local() >= self.local_limit {
            return Err(RequestError::LocalLimit(self.local_limit));
        }
        let id = self.allocate();
        Ok(self.insert(BatchRequest {
            id,
            kind,
            user: user.to_string(),
            host: host.to_string(),
            perm: Permission::manager(),
            flags,
            origin: RequestOrigin::Local { reservation },
            pending: 1,
            reply: None,
        }))
    }

    /// Create one branch of `parent` acting on `target`.
    ///
    /// The parent's pending count is raised before the branch exists.
    pub fn fan_out(&mut self, parent: RequestId, target: &str) -> Result<RequestId, RequestError> {
        if !self.requests.contains_key(&parent) {
            return Err(RequestError::Unknown(parent));
        }
        let id = self.allocate();
        let template = self
            .requests
            .get_mut(&parent)
            .ok_or(RequestError::Unknown(parent))?;
        template.pending += 1;

        let kind = match &template.kind {
            RequestKind::DeleteJob { .. } => RequestKind::DeleteJob {
                target: target.to_string(),
            },
            other => other.clone(),
        };
        let branch = BatchRequest {
            id,
            kind,
            user: template.user.clone(),
            host: template.host.clone(),
            perm: template.perm,
            flags: template.flags,
            origin: RequestOrigin::Branch { parent },
            pending: 1,
            reply: None,
        };
        Ok(self.insert(branch))
    }

    pub fn get(&self, id: RequestId) -> Option<&BatchRequest> {
        self.requests.get(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    /// Current pending count.
    pub fn pending(&self, id: RequestId) -> Option<u32> {
        self.requests.get(&id).map(|r| r.pending)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Local requests not yet answered.
    pub fn outstanding_local(&self) -> usize {
        self.requests
            .values()
            .filter(|r| matches!(r.origin, RequestOrigin::Local { .. }))
            .count()
    }

    /// Record `reply` and drop one hold.
    ///
    /// When several replies are recorded the most severe one is kept
    /// (rejection, then text, then history-purged, then ack); among equals
    /// the first wins.
    pub fn respond(&mut self, id: RequestId, reply: Reply) -> Result<Option<Delivery>, RequestError> {
        let request = self.requests.get_mut(&id).ok_or_else(|| {
            error!(request_id = %id, %reply, "reply for a request that is no longer outstanding");
            RequestError::Unknown(id)
        })?;
        let replace = match &request.reply {
            None => true,
            Some(current) => severity(&reply) > severity(current),
        };
        if replace {
            request.reply = Some(reply);
        }
        self.release(id)
    }

    /// Drop one hold without recording a reply.
    ///
    /// At zero the request leaves the table. A branch folds its reply into
    /// its parent; any other request is returned as a [`Delivery`].
    pub fn release(&mut self, id: RequestId) -> Result<Option<Delivery>, RequestError> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(RequestError::Unknown(id))?;
        request.pending = request.pending.saturating_sub(1);
        if request.pending > 0 {
            return Ok(None);
        }

        let Some(done) = self.requests.remove(&id) else {
            return Err(RequestError::Unknown(id));
        };
        let reply = done.reply.unwrap_or(Reply::Ack);
        debug!(request_id = %id, %reply, "request complete");

        match done.origin {
            RequestOrigin::Branch { parent } => self.respond(parent, reply),
            origin => Ok(Some(Delivery {
                id,
                origin,
                kind: done.kind,
                reply,
            })),
        }
    }
}

fn severity(reply: &Reply) -> u8 {
    match reply {
        Reply::Ack => 0,
        Reply::HistoryPurged => 1,
        Reply::Text { .. } => 2,
        Reply::Reject { .. } => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchdel_protocol::ReasonCode;

    fn table_with_client() -> (RequestTable, RequestId) {
        let mut table = RequestTable::new(4);
        let id = table.ingress(NewRequest::delete_job("1[].svr", "alice", "h1").with_extension("force"));
        (table, id)
    }

    #[test]
    fn test_ingress_parses_flags() {
        let (table, id) = table_with_client();
        let request = table.get(id).unwrap();
        assert!(request.flags.force);
        assert_eq!(request.pending, 1);
        assert_eq!(request.requester(), "alice@h1");
        assert!(!request.is_internal());
    }

    #[test]
    fn test_single_respond_delivers() {
        let (mut table, id) = table_with_client();
        let delivery = table.respond(id, Reply::Ack).unwrap().unwrap();
        assert_eq!(delivery.id, id);
        assert_eq!(delivery.reply, Reply::Ack);
        assert!(table.is_empty());
    }

    #[test]
    fn test_fan_out_delivers_once_after_last_branch() {
        let (mut table, id) = table_with_client();
        let a = table.fan_out(id, "1[1].svr").unwrap();
        let b = table.fan_out(id, "1[2].svr").unwrap();
        assert_eq!(table.pending(id), Some(3));
        assert_eq!(
            table.get(a).unwrap().kind,
            RequestKind::DeleteJob {
                target: "1[1].svr".to_string()
            }
        );

        assert!(table.respond(id, Reply::Ack).unwrap().is_none());
        assert!(table.respond(a, Reply::Ack).unwrap().is_none());
        let delivery = table.respond(b, Reply::Ack).unwrap().unwrap();
        assert_eq!(delivery.id, id);
        assert!(table.is_empty());

        assert_eq!(table.respond(id, Reply::Ack), Err(RequestError::Unknown(id)));
    }

    #[test]
    fn test_branch_rejection_wins() {
        let (mut table, id) = table_with_client();
        let a = table.fan_out(id, "1[1].svr").unwrap();
        table
            .respond(a, Reply::reject(ReasonCode::BadState, "exiting"))
            .unwrap();
        let delivery = table.respond(id, Reply::Ack).unwrap().unwrap();
        assert_eq!(delivery.reply.code(), Some(ReasonCode::BadState));
    }

    #[test]
    fn test_first_rejection_kept() {
        let (mut table, id) = table_with_client();
        let a = table.fan_out(id, "1[1].svr").unwrap();
        let b = table.fan_out(id, "1[2].svr").unwrap();
        table.respond(a, Reply::reject(ReasonCode::System, "first")).unwrap();
        table.respond(b, Reply::reject(ReasonCode::BadState, "second")).unwrap();
        let delivery = table.release(id).unwrap().unwrap();
        assert_eq!(delivery.reply, Reply::reject(ReasonCode::System, "first"));
    }

    #[test]
    fn test_local_limit() {
        let mut table = RequestTable::new(1);
        let kind = RequestKind::DeleteJob {
            target: "5.svr".to_string(),
        };
        let first = table
            .issue_local(kind.clone(), "server", "svr", DeleteFlags::default(), Some("R1.svr".into()))
            .unwrap();
        assert_eq!(table.get(first).unwrap().reservation(), Some("R1.svr"));
        assert!(table.get(first).unwrap().perm.manager);

        let err = table
            .issue_local(kind.clone(), "server", "svr", DeleteFlags::default(), None)
            .unwrap_err();
        assert_eq!(err, RequestError::LocalLimit(1));

        table.respond(first, Reply::Ack).unwrap();
        assert!(table
            .issue_local(kind, "server", "svr", DeleteFlags::default(), None)
            .is_ok());
    }
}
