//! Job state and substate
//!
//! The coarse state drives deletion policy; the substate records where
//! within that state the job is.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TerminalState;

/// Coarse job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Being moved to another server or execution agent
    Transiting,
    Queued,
    Held,
    /// Waiting for a start time
    Waiting,
    Running,
    /// Array parent with at least one subjob started
    Begun,
    Exiting,
    /// Subjob history record
    Expired,
    /// History record of a finished job
    Finished,
    /// History record of a job routed elsewhere
    Moved,
}

impl TerminalState for JobState {
    fn is_terminal(&self) -> bool {
        self.is_history()
    }
}

impl JobState {
    /// Whether the job is resting as a history record.
    pub fn is_history(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Moved | JobState::Expired)
    }

    /// Whether the job has not yet started executing.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Held | JobState::Waiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Transiting => "transiting",
            JobState::Queued => "queued",
            JobState::Held => "held",
            JobState::Waiting => "waiting",
            JobState::Running => "running",
            JobState::Begun => "begun",
            JobState::Exiting => "exiting",
            JobState::Expired => "expired",
            JobState::Finished => "finished",
            JobState::Moved => "moved",
        }
    }

    /// Substate a job normally sits in when entering this state.
    pub fn default_substate(&self) -> JobSubstate {
        match self {
            JobState::Transiting => JobSubstate::Transit,
            JobState::Queued => JobSubstate::Queued,
            JobState::Held => JobSubstate::Held,
            JobState::Waiting => JobSubstate::Waiting,
            JobState::Running | JobState::Begun => JobSubstate::Running,
            JobState::Exiting => JobSubstate::Exiting,
            JobState::Expired => JobSubstate::Expired,
            JobState::Finished => JobSubstate::Finished,
            JobState::Moved => JobSubstate::Moved,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained job substate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSubstate {
    Transit,
    Queued,
    Held,
    Waiting,
    /// Dispatched to an agent that has not yet acknowledged the start
    Prerun,
    Provisioning,
    Running,
    Suspended,
    SchedSuspended,
    /// Being terminated so it can be rerun
    Rerun,
    /// Termination signal delivered
    Term,
    /// Site terminate action running on the agent
    ScriptTerm,
    Exiting,
    Exited,
    /// In-transit route being aborted
    Abort,
    /// Deleted before or during execution
    Terminated,
    Finished,
    Expired,
    Moved,
}

impl TerminalState for JobSubstate {
    fn is_terminal(&self) -> bool {
        self.is_done()
    }
}

impl JobSubstate {
    /// Whether an array table entry with this substate counts as done.
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            JobSubstate::Terminated | JobSubstate::Finished | JobSubstate::Expired
        )
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, JobSubstate::Suspended | JobSubstate::SchedSuspended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobSubstate::Transit => "transit",
            JobSubstate::Queued => "queued",
            JobSubstate::Held => "held",
            JobSubstate::Waiting => "waiting",
            JobSubstate::Prerun => "prerun",
            JobSubstate::Provisioning => "provisioning",
            JobSubstate::Running => "running",
            JobSubstate::Suspended => "suspended",
            JobSubstate::SchedSuspended => "sched_suspended",
            JobSubstate::Rerun => "rerun",
            JobSubstate::Term => "term",
            JobSubstate::ScriptTerm => "script_term",
            JobSubstate::Exiting => "exiting",
            JobSubstate::Exited => "exited",
            JobSubstate::Abort => "abort",
            JobSubstate::Terminated => "terminated",
            JobSubstate::Finished => "finished",
            JobSubstate::Expired => "expired",
            JobSubstate::Moved => "moved",
        }
    }
}

impl fmt::Display for JobSubstate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
