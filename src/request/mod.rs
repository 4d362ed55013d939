//! Batch requests
//!
//! A request is created at ingress with a pending count of one. Fan-out
//! branches raise the count of their parent; the reply is delivered when
//! the count returns to zero, and only then.

mod flags;
mod table;

pub use flags::DeleteFlags;
pub use table::{Delivery, RequestError, RequestTable};

use batchdel_protocol::Reply;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a request in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestKind {
    DeleteJob { target: String },
    DeleteReservation { target: String },
    ResvOccurrenceEnd { target: String },
    /// Self-addressed queue admission change.
    ManageQueue {
        queue: String,
        enabled: bool,
        started: bool,
    },
    /// A reservation submitter waiting for confirmation or denial.
    AwaitReservation { target: String },
}

impl RequestKind {
    /// Identifier the request acts on.
    pub fn target(&self) -> &str {
        match self {
            RequestKind::DeleteJob { target }
            | RequestKind::DeleteReservation { target }
            | RequestKind::ResvOccurrenceEnd { target }
            | RequestKind::AwaitReservation { target } => target,
            RequestKind::ManageQueue { queue, .. } => queue,
        }
    }
}

/// Privilege held by the requester.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(default)]
    pub manager: bool,
    #[serde(default)]
    pub operator: bool,
}

impl Permission {
    pub fn manager() -> Self {
        Self {
            manager: true,
            operator: false,
        }
    }

    /// Whether the requester may act on jobs it does not own.
    pub fn is_privileged(&self) -> bool {
        self.manager || self.operator
    }
}

/// Where a request came from and where its reply goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum RequestOrigin {
    /// An external caller.
    Client,
    /// Issued by the server to itself, optionally on behalf of a reservation.
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reservation: Option<String>,
    },
    /// One fan-out branch; its reply folds into the parent.
    Branch { parent: RequestId },
}

/// Caller intent as presented at ingress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub kind: RequestKind,
    pub user: String,
    pub host: String,
    #[serde(default)]
    pub perm: Permission,
    /// Free-form extension tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl NewRequest {
    /// A job delete from `user@host`.
    pub fn delete_job(target: impl Into<String>, user: &str, host: &str) -> Self {
        Self::new(
            RequestKind::DeleteJob {
                target: target.into(),
            },
            user,
            host,
        )
    }

    /// A reservation delete from `user@host`.
    pub fn delete_reservation(target: impl Into<String>, user: &str, host: &str) -> Self {
        Self::new(
            RequestKind::DeleteReservation {
                target: target.into(),
            },
            user,
            host,
        )
    }

    pub fn new(kind: RequestKind, user: &str, host: &str) -> Self {
        Self {
            kind,
            user: user.to_string(),
            host: host.to_string(),
            perm: Permission::default(),
            extension: None,
        }
    }

    pub fn with_perm(mut self, perm: Permission) -> Self {
        self.perm = perm;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

/// An in-flight request.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub id: RequestId,
    pub kind: RequestKind,
    pub user: String,
    pub host: String,
    pub perm: Permission,
    pub flags: DeleteFlags,
    pub origin: RequestOrigin,
    /// Outstanding holds: one for the request itself plus one per live branch.
    pub pending: u32,
    /// Reply recorded so far; delivered when `pending` reaches zero.
    pub reply: Option<Reply>,
}

impl BatchRequest {
    /// `user@host` of the requester.
    pub fn requester(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Whether this request was issued by the server rather than a caller.
    pub fn is_internal(&self) -> bool {
        !matches!(self.origin, RequestOrigin::Client)
    }

    /// Reservation on whose behalf a local request was issued.
    pub fn reservation(&self) -> Option<&str> {
        match &self.origin {
            RequestOrigin::Local { reservation } => reservation.as_deref(),
            _ => None,
        }
    }
}
