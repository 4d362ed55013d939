//! Scenario file model.

use batchdel_agent::{AgentOp, FailureConfig};
use serde::{Deserialize, Serialize};

use crate::request::Permission;
use crate::state::{JobState, JobSubstate, ReservationState};
use crate::store::{JobFlags, ResourceHold};

/// A scenario: initial records, agent behaviour and a timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    /// Config overlay applied above the host file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Table>,

    #[serde(default)]
    pub agent: AgentSpec,

    #[serde(default, rename = "queue")]
    pub queues: Vec<QueueSpec>,

    #[serde(default, rename = "job")]
    pub jobs: Vec<JobSpec>,

    #[serde(default, rename = "array")]
    pub arrays: Vec<ArraySpec>,

    #[serde(default, rename = "reservation")]
    pub reservations: Vec<ReservationSpec>,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// Simulated agent behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSpec {
    /// Signals the agent does not support.
    pub unknown_signals: Vec<String>,
    pub terminate_script: bool,
    pub exit_on_signal: bool,
    pub failures: Vec<FailureSpec>,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            unknown_signals: Vec::new(),
            terminate_script: false,
            exit_on_signal: true,
            failures: Vec::new(),
        }
    }
}

/// One injected agent failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSpec {
    pub op: AgentOp,
    #[serde(flatten)]
    pub failure: FailureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_queue() -> String {
    "workq".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub owner: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_job_state")]
    pub state: JobState,
    /// Defaults to the state's usual substate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substate: Option<JobSubstate>,
    #[serde(default)]
    pub flags: JobFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceHold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

fn default_job_state() -> JobState {
    JobState::Queued
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySpec {
    /// Parent id, `<seq>[]` form.
    pub id: String,
    pub owner: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Index range of the array, e.g. `1-10`.
    pub indices: String,
    #[serde(default = "default_job_state")]
    pub state: JobState,
    #[serde(default, rename = "subjob")]
    pub subjobs: Vec<SubjobSpec>,
}

/// A subjob that differs from queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjobSpec {
    pub index: u32,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substate: Option<JobSubstate>,
    /// Whether a job record exists for the subjob.
    #[serde(default)]
    pub record: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSpec {
    pub id: String,
    pub owner: String,
    #[serde(default = "default_resv_state")]
    pub state: ReservationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// `user@host` waiting for the confirmation reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter: Option<String>,
    #[serde(default)]
    pub wait_expired: bool,
}

fn default_resv_state() -> ReservationState {
    ReservationState::Confirmed
}

/// Who issues a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub user: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub perm: Permission,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

/// One timeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Delete {
        target: String,
        #[serde(flatten)]
        caller: Caller,
    },
    DeleteReservation {
        target: String,
        #[serde(flatten)]
        caller: Caller,
    },
    OccurrenceEnd {
        target: String,
        #[serde(flatten)]
        caller: Caller,
    },
    /// Move the virtual clock.
    Advance { seconds: u64 },
    /// Drain agent events and ready tasks.
    Run,
    JobExit {
        job: String,
        #[serde(default)]
        exit_status: i32,
    },
    JobStarted { job: String },
    Route { job: String, destination: String },
    RouteDone {
        job: String,
        #[serde(default)]
        delivered: bool,
    },
    /// Hold or release agent replies.
    HoldReplies { hold: bool },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Delete { .. } => "delete",
            Step::DeleteReservation { .. } => "delete_reservation",
            Step::OccurrenceEnd { .. } => "occurrence_end",
            Step::Advance { .. } => "advance",
            Step::Run => "run",
            Step::JobExit { .. } => "job_exit",
            Step::JobStarted { .. } => "job_started",
            Step::Route { .. } => "route",
            Step::RouteDone { .. } => "route_done",
            Step::HoldReplies { .. } => "hold_replies",
        }
    }
}
