//! Peer server transport.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::info;

use super::TransportError;
use crate::state::JobState;

/// Requests sent to other servers.
pub trait PeerTransport: fmt::Debug {
    /// Forward a delete for a job now owned by `server`.
    fn issue_delete(
        &mut self,
        server: &str,
        job_id: &str,
        purge_history: bool,
    ) -> Result<(), TransportError>;

    /// Report a job's new state to the server tracking it.
    fn issue_track(&mut self, server: &str, job_id: &str, state: JobState) -> Result<(), TransportError>;
}

/// A message handed to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PeerMessage {
    Delete {
        server: String,
        job_id: String,
        purge_history: bool,
    },
    Track {
        server: String,
        job_id: String,
        state: JobState,
    },
}

#[derive(Debug, Default)]
struct PeerLog {
    sent: Vec<PeerMessage>,
    unreachable: Vec<String>,
}

/// [`PeerTransport`] that records every message.
#[derive(Debug, Clone, Default)]
pub struct RecordingPeers {
    log: Rc<RefCell<PeerLog>>,
}

impl RecordingPeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `server` refuse connections.
    pub fn set_unreachable(&self, server: impl Into<String>) {
        self.log.borrow_mut().unreachable.push(server.into());
    }

    pub fn sent(&self) -> Vec<PeerMessage> {
        self.log.borrow().sent.clone()
    }

    fn send(&self, server: &str, message: PeerMessage) -> Result<(), TransportError> {
        let mut log = self.log.borrow_mut();
        if log.unreachable.iter().any(|s| s == server) {
            return Err(TransportError::Unreachable(server.to_string()));
        }
        info!(server, ?message, "peer request");
        log.sent.push(message);
        Ok(())
    }
}

impl PeerTransport for RecordingPeers {
    fn issue_delete(
        &mut self,
        server: &str,
        job_id: &str,
        purge_history: bool,
    ) -> Result<(), TransportError> {
        self.send(
            server,
            PeerMessage::Delete {
                server: server.to_string(),
                job_id: job_id.to_string(),
                purge_history,
            },
        )
    }

    fn issue_track(&mut self, server: &str, job_id: &str, state: JobState) -> Result<(), TransportError> {
        self.send(
            server,
            PeerMessage::Track {
                server: server.to_string(),
                job_id: job_id.to_string(),
                state,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_messages() {
        let peers = RecordingPeers::new();
        let mut transport = peers.clone();
        transport.issue_delete("peer", "5.peer", true).unwrap();
        assert_eq!(
            peers.sent(),
            vec![PeerMessage::Delete {
                server: "peer".into(),
                job_id: "5.peer".into(),
                purge_history: true,
            }]
        );
    }

    #[test]
    fn test_unreachable_peer() {
        let mut peers = RecordingPeers::new();
        peers.set_unreachable("down");
        let err = peers.issue_track("down", "1.svr", JobState::Exiting).unwrap_err();
        assert_eq!(err, TransportError::Unreachable("down".into()));
        assert!(peers.sent().is_empty());
    }
}
