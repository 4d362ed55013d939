//! Continuation, trigger and owner types.

use batchdel_protocol::{ExchangeId, Reply, SignalReply};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::request::RequestId;

/// Entity whose lifetime bounds a task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
    Job(String),
    Reservation(String),
    Server,
}

/// What resumes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "on", content = "value", rename_all = "snake_case")]
pub enum Trigger {
    /// Next turn of the scheduler.
    Immediate,
    /// Virtual-clock deadline.
    At(DateTime<Utc>),
    /// Completion of an agent exchange.
    Exchange(ExchangeId),
    /// Reply to a locally issued request.
    RequestReply(RequestId),
}

/// Suspended work with its captured state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Continuation {
    /// Run a queued request.
    Dispatch { request: RequestId },
    /// Retry a delete that raced with job start.
    RetryDelete { request: RequestId, job: String },
    /// Await the agent's answer to a signal.
    SignalReply {
        job: String,
        /// `None` once a force delete has finalized the job.
        request: Option<RequestId>,
        signal: String,
        /// Fallback attempts already made.
        tries: u8,
    },
    /// Await the end of an in-flight route.
    RouteDone {
        job: String,
        request: Option<RequestId>,
    },
    /// Run end-of-job processing.
    JobExit { job: String },
    /// Re-count a draining reservation.
    ResvRecheck { resv: String },
    /// Handle the reply to a self-addressed request.
    LocalReply {
        resv: Option<String>,
        job: Option<String>,
    },
}

impl Continuation {
    /// Request the continuation answers, if any.
    pub fn request(&self) -> Option<RequestId> {
        match self {
            Continuation::Dispatch { request } | Continuation::RetryDelete { request, .. } => {
                Some(*request)
            }
            Continuation::SignalReply { request, .. } | Continuation::RouteDone { request, .. } => {
                *request
            }
            Continuation::JobExit { .. }
            | Continuation::ResvRecheck { .. }
            | Continuation::LocalReply { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Continuation::Dispatch { .. } => "dispatch",
            Continuation::RetryDelete { .. } => "retry_delete",
            Continuation::SignalReply { .. } => "signal_reply",
            Continuation::RouteDone { .. } => "route_done",
            Continuation::JobExit { .. } => "job_exit",
            Continuation::ResvRecheck { .. } => "resv_recheck",
            Continuation::LocalReply { .. } => "local_reply",
        }
    }
}

/// Event that made a task ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Immediate or timed wake-up.
    Wake,
    Signal(SignalReply),
    Route { delivered: bool },
    Reply(Reply),
}
