//! Job records.

use batchdel_protocol::ExchangeId;
use serde::{Deserialize, Serialize};

use super::ArrayTracking;
use crate::request::RequestId;
use crate::state::{JobState, JobSubstate};

/// Job attribute flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFlags {
    /// Input files were staged in on the execution host.
    pub staged_in: bool,
    /// A checkpoint restart file exists.
    pub checkpoint: bool,
    /// The job is owned by this server.
    pub local: bool,
}

impl Default for JobFlags {
    fn default() -> Self {
        Self {
            staged_in: false,
            checkpoint: false,
            local: true,
        }
    }
}

/// Whether the job holds execution resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceHold {
    #[default]
    None,
    Held,
    /// Released while suspended; re-assigned before teardown.
    Released,
}

/// A job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// `user@host`
    pub owner: String,
    pub queue: String,
    pub state: JobState,
    pub substate: JobSubstate,
    pub flags: JobFlags,

    /// Present on array parents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<ArrayTracking>,
    /// Parent id, present on subjobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    pub termination_in_progress: bool,
    pub purge_history_on_finish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    pub resources: ResourceHold,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// `queue@server` the job is routed or was moved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// In-flight route exchange.
    #[serde(skip)]
    pub transit_exchange: Option<ExchangeId>,
    /// Outstanding signal exchange; at most one per job.
    #[serde(skip)]
    pub signal_exchange: Option<ExchangeId>,
    /// Delete that set `termination_in_progress`.
    #[serde(skip)]
    pub termination_request: Option<RequestId>,
}

impl Job {
    /// A queued job.
    pub fn new(id: impl Into<String>, owner: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            queue: queue.into(),
            state: JobState::Queued,
            substate: JobSubstate::Queued,
            flags: JobFlags::default(),
            array: None,
            parent: None,
            index: None,
            termination_in_progress: false,
            purge_history_on_finish: false,
            exit_status: None,
            resources: ResourceHold::None,
            comment: None,
            destination: None,
            transit_exchange: None,
            signal_exchange: None,
            termination_request: None,
        }
    }

    /// An array parent owning `array`.
    pub fn array_parent(
        id: impl Into<String>,
        owner: impl Into<String>,
        queue: impl Into<String>,
        array: ArrayTracking,
    ) -> Self {
        Self {
            array: Some(array),
            ..Self::new(id, owner, queue)
        }
    }

    /// The materialized record of subjob `index` of `parent`.
    pub fn subjob(parent: &Job, id: impl Into<String>, index: u32) -> Self {
        Self {
            parent: Some(parent.id.clone()),
            index: Some(index),
            ..Self::new(id, parent.owner.clone(), parent.queue.clone())
        }
    }

    /// Set state and substate; running states hold resources.
    pub fn with_state(mut self, state: JobState, substate: JobSubstate) -> Self {
        self.set_state(state, substate);
        if matches!(state, JobState::Running | JobState::Exiting) {
            self.resources = ResourceHold::Held;
        }
        self
    }

    pub fn with_flags(mut self, flags: JobFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn set_state(&mut self, state: JobState, substate: JobSubstate) {
        self.state = state;
        self.substate = substate;
    }

    /// User part of the owner.
    pub fn owner_user(&self) -> &str {
        self.owner.split('@').next().unwrap_or_default()
    }

    pub fn is_array_parent(&self) -> bool {
        self.array.is_some()
    }

    pub fn is_subjob(&self) -> bool {
        self.parent.is_some()
    }

    /// Server part of the destination.
    pub fn destination_server(&self) -> Option<&str> {
        self.destination
            .as_deref()
            .and_then(|d| d.split_once('@'))
            .map(|(_, server)| server)
            .filter(|server| !server.is_empty())
    }

    /// Server a moved job now lives on.
    pub fn moved_to_server(&self) -> Option<&str> {
        match self.state {
            JobState::Moved => self.destination_server(),
            _ => None,
        }
    }
}
