//! Deletion errors and their reason codes.

use batchdel_jobid::{JobIdError, RangeError};
use batchdel_protocol::{Reply, ReasonCode};
use serde::Serialize;

use crate::request::RequestError;
use crate::state::JobState;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Error classes reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected before any side effect.
    Validation,
    /// The execution agent refused or could not be reached.
    AgentProtocol,
    /// Server bookkeeping disagrees with itself.
    InternalConsistency,
    /// Some branches of a fan-out could not be issued.
    PartialFailure,
}

/// Errors raised while deleting jobs and reservations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeleteError {
    #[error("unknown job {0}")]
    UnknownJob(String),

    #[error("unknown reservation {0}")]
    UnknownReservation(String),

    #[error("unknown queue {0}")]
    UnknownQueue(String),

    #[error("{user} may not delete {target}")]
    PermissionDenied { target: String, user: String },

    #[error("invalid request for {target}: {reason}")]
    InvalidRequest { target: String, reason: String },

    #[error(transparent)]
    MalformedId(#[from] JobIdError),

    #[error("malformed subjob range: {0}")]
    MalformedRange(#[from] RangeError),

    #[error("subjob index {index} exceeds array maximum {max}")]
    IndexOutOfRange { index: u32, max: u32 },

    #[error("{job} cannot be deleted while {state}")]
    BadState { job: String, state: String },

    #[error("history of subjob {0} cannot be purged on its own")]
    NoHistoryForSubjob(String),

    #[error("{0} is a history job")]
    HistoryJob(String),

    #[error("agent rejected {signal} for {job}: {code}")]
    AgentRejected {
        job: String,
        signal: String,
        code: ReasonCode,
    },

    #[error("no exchange in flight for {0}")]
    MissingExchange(String),

    #[error("array {0} is already being iterated")]
    ArrayBusy(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("could not issue request: {0}")]
    Dispatch(#[from] RequestError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DeleteError {
    pub fn bad_state(job: &str, state: JobState, detail: impl std::fmt::Display) -> Self {
        Self::BadState {
            job: job.to_string(),
            state: format!("{}/{}", state, detail),
        }
    }

    pub fn invalid(target: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Reason code carried by the rejection.
    pub fn code(&self) -> ReasonCode {
        match self {
            DeleteError::UnknownJob(_) => ReasonCode::UnknownJobId,
            DeleteError::UnknownReservation(_) => ReasonCode::UnknownReservation,
            DeleteError::UnknownQueue(_) => ReasonCode::UnknownQueue,
            DeleteError::PermissionDenied { .. } => ReasonCode::PermissionDenied,
            DeleteError::InvalidRequest { .. }
            | DeleteError::MalformedId(_)
            | DeleteError::MalformedRange(_)
            | DeleteError::IndexOutOfRange { .. } => ReasonCode::InvalidRequest,
            DeleteError::BadState { .. } | DeleteError::ArrayBusy(_) => ReasonCode::BadState,
            DeleteError::NoHistoryForSubjob(_) => ReasonCode::NoHistoryForSubjob,
            DeleteError::HistoryJob(_) => ReasonCode::HistoryJob,
            DeleteError::AgentRejected { code, .. } => *code,
            DeleteError::MissingExchange(_) | DeleteError::Store(_) => ReasonCode::Internal,
            DeleteError::Transport(e) => e.code(),
            DeleteError::Dispatch(_) => ReasonCode::System,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DeleteError::AgentRejected { .. } | DeleteError::Transport(_) => {
                ErrorClass::AgentProtocol
            }
            DeleteError::MissingExchange(_) | DeleteError::Store(_) => {
                ErrorClass::InternalConsistency
            }
            DeleteError::Dispatch(_) => ErrorClass::PartialFailure,
            _ => ErrorClass::Validation,
        }
    }

    /// The rejection sent to the caller.
    pub fn to_reply(&self) -> Reply {
        Reply::reject(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_codes() {
        let err = DeleteError::IndexOutOfRange { index: 20, max: 10 };
        assert_eq!(err.code(), ReasonCode::InvalidRequest);
        assert_eq!(err.class(), ErrorClass::Validation);

        let err = DeleteError::from(RangeError::ZeroStep("1-3:0".into()));
        assert_eq!(err.code(), ReasonCode::InvalidRequest);
    }

    #[test]
    fn test_agent_and_internal_classes() {
        let err = DeleteError::AgentRejected {
            job: "1.svr".into(),
            signal: "SIGKILL".into(),
            code: ReasonCode::System,
        };
        assert_eq!(err.class(), ErrorClass::AgentProtocol);
        assert_eq!(err.code(), ReasonCode::System);

        let err = DeleteError::MissingExchange("4.svr".into());
        assert_eq!(err.class(), ErrorClass::InternalConsistency);
        assert_eq!(err.code(), ReasonCode::Internal);
    }

    #[test]
    fn test_dispatch_is_partial_failure() {
        let err = DeleteError::from(RequestError::LocalLimit(4));
        assert_eq!(err.class(), ErrorClass::PartialFailure);
        assert_eq!(err.code(), ReasonCode::System);
    }

    #[test]
    fn test_to_reply() {
        let reply = DeleteError::bad_state("1.svr", JobState::Exiting, "exiting").to_reply();
        assert!(reply.is_reject());
        assert_eq!(reply.code(), Some(ReasonCode::BadState));
        assert!(reply.to_string().contains("1.svr"));
    }
}
