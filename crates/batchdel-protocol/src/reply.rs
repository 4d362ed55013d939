//! Replies delivered to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reason::ReasonCode;

/// The single reply a request eventually produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// Plain acknowledgment.
    Ack,
    /// A history record was purged instead of a live delete.
    HistoryPurged,
    /// The request was refused.
    Reject { code: ReasonCode, message: String },
    /// Free-form text, optionally tagged with a reason code.
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ReasonCode>,
        text: String,
    },
}

impl Reply {
    /// Create a rejection.
    pub fn reject(code: ReasonCode, message: impl Into<String>) -> Self {
        Self::Reject {
            code,
            message: message.into(),
        }
    }

    /// Create an untagged text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            code: None,
            text: text.into(),
        }
    }

    /// Create a text reply tagged with a reason code.
    pub fn coded_text(code: ReasonCode, text: impl Into<String>) -> Self {
        Self::Text {
            code: Some(code),
            text: text.into(),
        }
    }

    /// Whether this is a rejection.
    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject { .. })
    }

    /// Reason code, if the reply carries one.
    pub fn code(&self) -> Option<ReasonCode> {
        match self {
            Self::Reject { code, .. } => Some(*code),
            Self::Text { code, .. } => *code,
            Self::Ack | Self::HistoryPurged => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ACK"),
            Self::HistoryPurged => write!(f, "HISTORY_PURGED"),
            Self::Reject { code, message } => write!(f, "REJECT {}: {}", code, message),
            Self::Text {
                code: Some(code),
                text,
            } => write!(f, "TEXT {}: {}", code, text),
            Self::Text { code: None, text } => write!(f, "TEXT {}", text),
        }
    }
}
