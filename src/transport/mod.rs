//! Transports to execution agents and peer servers.

mod agent;
mod peer;

pub use agent::{AgentLink, ExecutionAgent};
pub use peer::{PeerMessage, PeerTransport, RecordingPeers};

use batchdel_agent::AgentError;
use batchdel_protocol::ReasonCode;

/// Transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{0} unreachable")]
    Unreachable(String),

    #[error("rejected with {code}: {message}")]
    Rejected { code: ReasonCode, message: String },

    #[error("no exchange in flight for {0}")]
    NoExchange(String),
}

impl TransportError {
    /// Reason code to report to a caller.
    pub fn code(&self) -> ReasonCode {
        match self {
            TransportError::Unreachable(_) => ReasonCode::System,
            TransportError::Rejected { code, .. } => *code,
            TransportError::NoExchange(_) => ReasonCode::Internal,
        }
    }
}

impl From<AgentError> for TransportError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Unreachable(msg) => TransportError::Unreachable(msg),
            AgentError::Rejected { code, message, .. } => TransportError::Rejected { code, message },
            AgentError::NoRoute(job) => TransportError::NoExchange(job),
        }
    }
}
