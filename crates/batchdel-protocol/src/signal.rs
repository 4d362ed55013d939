//! Signal exchange between the server and an execution agent.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reason::ReasonCode;
use crate::{SIGNAL_EXIT_BASE, SIGKILL};

/// Identifier of one asynchronous exchange with an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Request asking an agent to deliver a signal to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub job_id: String,
    pub signal: String,
}

impl SignalRequest {
    pub fn new(job_id: impl Into<String>, signal: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            signal: signal.into(),
        }
    }
}

/// Auxiliary code attached to a successful signal reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxCode {
    #[default]
    None,
    /// The agent started the site terminate action; job exit is reported later.
    TerminateScript,
}

/// Agent reply to a [`SignalRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalReply {
    pub job_id: String,
    /// None on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ReasonCode>,
    #[serde(default)]
    pub aux: AuxCode,
}

impl SignalReply {
    pub fn success(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            code: None,
            aux: AuxCode::None,
        }
    }

    pub fn failure(job_id: impl Into<String>, code: ReasonCode) -> Self {
        Self {
            job_id: job_id.into(),
            code: Some(code),
            aux: AuxCode::None,
        }
    }

    pub fn with_aux(mut self, aux: AuxCode) -> Self {
        self.aux = aux;
        self
    }

    pub fn is_success(&self) -> bool {
        self.code.is_none()
    }
}

/// Asynchronous events emitted by an execution agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Reply to an outstanding signal exchange.
    SignalReply {
        exchange: ExchangeId,
        reply: SignalReply,
    },
    /// Completion of an in-flight route exchange.
    RouteDone {
        exchange: ExchangeId,
        job_id: String,
        delivered: bool,
    },
    /// The job's processes have ended.
    JobExit { job_id: String, exit_status: i32 },
}

/// Exit status reported for a job ended by `signal`.
pub fn exit_status_for_signal(signal: &str) -> i32 {
    let number = match signal {
        SIGKILL => 9,
        // TERM and the site terminate action both end in SIGTERM.
        _ => 15,
    };
    SIGNAL_EXIT_BASE + number
}
