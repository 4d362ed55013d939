//! Side-effect sinks: accounting, mail and extension hooks
//!
//! Every sink is fire-and-forget from the control plane's point of view.
//! [`Effects`] wraps the sinks and logs failures instead of returning them.

mod recorder;

pub use recorder::Recorder;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Side-effect sink failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    #[error("accounting write failed: {0}")]
    Accounting(String),

    #[error("mail delivery failed: {0}")]
    Mail(String),

    #[error("hook execution failed: {0}")]
    Hook(String),
}

/// Kind of accounting record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// A job was deleted.
    JobDeleted,
    /// The reservation owner deleted a reservation.
    ResvDeletedByClient,
    /// The server or scheduler deleted a reservation.
    ResvDeletedByServer,
}

/// One accounting line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub kind: AccountKind,
    pub id: String,
    pub text: String,
}

impl AccountRecord {
    /// The "deleted" audit record for a job.
    pub fn job_deleted(job_id: &str, requester: &str) -> Self {
        Self {
            kind: AccountKind::JobDeleted,
            id: job_id.to_string(),
            text: format!("requestor={}", requester),
        }
    }
}

/// A notification to a job or reservation owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub to: String,
    pub about: String,
    pub body: String,
}

/// Extension hook events raised by deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    ResvEnd,
    ResvOccurrenceEnd,
}

/// Outcome of a hook run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "message", rename_all = "snake_case")]
pub enum HookVerdict {
    Accept,
    Reject(String),
}

pub trait Accounting: fmt::Debug {
    fn record(&mut self, record: AccountRecord) -> Result<(), EffectError>;
}

pub trait Mailer: fmt::Debug {
    fn send(&mut self, mail: MailMessage) -> Result<(), EffectError>;
}

pub trait HookRunner: fmt::Debug {
    fn run(&mut self, event: HookEvent, resv_id: &str) -> Result<HookVerdict, EffectError>;
}

/// The side-effect sinks used by the server.
#[derive(Debug)]
pub struct Effects {
    accounting: Box<dyn Accounting>,
    mailer: Box<dyn Mailer>,
    hooks: Box<dyn HookRunner>,
}

impl Effects {
    pub fn new(
        accounting: Box<dyn Accounting>,
        mailer: Box<dyn Mailer>,
        hooks: Box<dyn HookRunner>,
    ) -> Self {
        Self {
            accounting,
            mailer,
            hooks,
        }
    }

    pub fn account(&mut self, record: AccountRecord) {
        debug!(id = %record.id, kind = ?record.kind, text = %record.text, "accounting record");
        if let Err(e) = self.accounting.record(record) {
            warn!(error = %e, "accounting record dropped");
        }
    }

    pub fn mail(&mut self, to: &str, about: &str, body: impl Into<String>) {
        let mail = MailMessage {
            to: to.to_string(),
            about: about.to_string(),
            body: body.into(),
        };
        if let Err(e) = self.mailer.send(mail) {
            warn!(to, about, error = %e, "mail not sent");
        }
    }

    /// Run a hook. A hook that fails to run accepts by default.
    pub fn run_hook(&mut self, event: HookEvent, resv_id: &str) -> HookVerdict {
        match self.hooks.run(event, resv_id) {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(resv_id, ?event, error = %e, "hook failed; accepting by default");
                HookVerdict::Accept
            }
        }
    }
}
