//! Batch deletion protocol types.
//!
//! Defines the replies sent to callers, the reason-code registry, and the
//! signal exchange carried between the server and its execution agents.

pub mod reason;
pub mod reply;
pub mod signal;

pub use reason::{ReasonCode, UnknownReasonCode};
pub use reply::Reply;
pub use signal::{
    exit_status_for_signal, AgentEvent, AuxCode, ExchangeId, SignalReply, SignalRequest,
};

/// Unconditional kill signal.
pub const SIGKILL: &str = "SIGKILL";

/// Plain termination signal.
pub const SIGTERM: &str = "SIGTERM";

/// Signal asking the agent to run the site terminate action for a job.
pub const SIG_TERMJOB: &str = "TermJob";

/// Offset added to a signal number to form a "killed by signal" exit status.
pub const SIGNAL_EXIT_BASE: i32 = 0x100;

/// Exit status recorded for a job killed by the unconditional kill signal.
pub const KILL_EXIT_STATUS: i32 = SIGNAL_EXIT_BASE + 9;
