//! Reason codes carried by rejections and agent replies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reason codes returned in rejections.
///
/// These codes are stable and used for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// No job with the given identifier exists.
    UnknownJobId,
    /// No reservation with the given identifier exists.
    UnknownReservation,
    /// No queue with the given name exists.
    UnknownQueue,
    /// The agent does not recognise the requested signal.
    UnknownSignal,
    /// The target's current state does not allow the operation.
    BadState,
    /// History of an individual subjob cannot be purged on its own.
    NoHistoryForSubjob,
    /// The target is a history job and history purge was not requested.
    HistoryJob,
    /// Malformed target, range, or request.
    InvalidRequest,
    /// Requester is neither the owner nor privileged.
    PermissionDenied,
    /// Transport or agent failure.
    System,
    /// Server-internal consistency failure.
    Internal,
    /// Reservation status message.
    ResvMessage,
    /// An extension hook rejected the event.
    HookError,
}

impl ReasonCode {
    /// All codes, in registry order.
    pub const ALL: [ReasonCode; 13] = [
        ReasonCode::UnknownJobId,
        ReasonCode::UnknownReservation,
        ReasonCode::UnknownQueue,
        ReasonCode::UnknownSignal,
        ReasonCode::BadState,
        ReasonCode::NoHistoryForSubjob,
        ReasonCode::HistoryJob,
        ReasonCode::InvalidRequest,
        ReasonCode::PermissionDenied,
        ReasonCode::System,
        ReasonCode::Internal,
        ReasonCode::ResvMessage,
        ReasonCode::HookError,
    ];

    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownJobId => "UNKNOWN_JOB_ID",
            Self::UnknownReservation => "UNKNOWN_RESERVATION",
            Self::UnknownQueue => "UNKNOWN_QUEUE",
            Self::UnknownSignal => "UNKNOWN_SIGNAL",
            Self::BadState => "BAD_STATE",
            Self::NoHistoryForSubjob => "NO_HISTORY_FOR_SUBJOB",
            Self::HistoryJob => "HISTORY_JOB",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::System => "SYSTEM",
            Self::Internal => "INTERNAL",
            Self::ResvMessage => "RESV_MESSAGE",
            Self::HookError => "HOOK_ERROR",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unregistered reason code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reason code: {0}")]
pub struct UnknownReasonCode(pub String);

impl FromStr for ReasonCode {
    type Err = UnknownReasonCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownReasonCode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for code in ReasonCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }

    #[test]
    fn test_from_str_round_trip() {
        assert_eq!("bad_state".parse::<ReasonCode>(), Ok(ReasonCode::BadState));
        assert_eq!(
            "UNKNOWN_SIGNAL".parse::<ReasonCode>(),
            Ok(ReasonCode::UnknownSignal)
        );
        assert!("NOPE".parse::<ReasonCode>().is_err());
    }
}
