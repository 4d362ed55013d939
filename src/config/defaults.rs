//! Built-in defaults and the typed settings they populate.

use batchdel_protocol::{SIGKILL, SIG_TERMJOB};
use serde::{Deserialize, Serialize};

use super::effective::ConfigError;

/// Retry and re-check intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Delay before retrying a delete that raced a job launch.
    pub prerun_retry_seconds: u64,

    /// Interval between reservation drain re-checks.
    pub resv_recheck_seconds: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            prerun_retry_seconds: 1,
            resv_recheck_seconds: 30,
        }
    }
}

/// Signals used by the termination protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Sent for a non-forced delete.
    pub terminate: String,

    /// Sent for a forced delete.
    pub kill: String,

    /// Sent once after the agent reports an unknown signal.
    pub fallback: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            terminate: SIG_TERMJOB.to_string(),
            kill: SIGKILL.to_string(),
            fallback: SIGKILL.to_string(),
        }
    }
}

/// Effective server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteConfig {
    /// Suffix appended to unqualified job identifiers.
    pub server_name: String,

    /// Keep finished jobs as history unless a purge was requested.
    pub keep_history: bool,

    /// Server-wide mail switch.
    pub mail_enabled: bool,

    /// Bound on outstanding self-addressed requests.
    pub max_local_requests: usize,

    pub timers: TimerConfig,

    pub signals: SignalConfig,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            server_name: "batchsrv".to_string(),
            keep_history: true,
            mail_enabled: true,
            max_local_requests: 1024,
            timers: TimerConfig::default(),
            signals: SignalConfig::default(),
        }
    }
}

impl DeleteConfig {
    /// Convert to a JSON value for merging.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "server_name": self.server_name,
            "keep_history": self.keep_history,
            "mail_enabled": self.mail_enabled,
            "max_local_requests": self.max_local_requests,
            "timers": {
                "prerun_retry_seconds": self.timers.prerun_retry_seconds,
                "resv_recheck_seconds": self.timers.resv_recheck_seconds
            },
            "signals": {
                "terminate": self.signals.terminate,
                "kill": self.signals.kill,
                "fallback": self.signals.fallback
            }
        })
    }

    /// Check value bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server_name must not be empty".to_string(),
            ));
        }

        let prerun = self.timers.prerun_retry_seconds;
        if prerun == 0 || prerun > 60 {
            return Err(ConfigError::ValidationError(
                "timers.prerun_retry_seconds must be in (0, 60]".to_string(),
            ));
        }

        let recheck = self.timers.resv_recheck_seconds;
        if recheck == 0 || recheck > 3600 {
            return Err(ConfigError::ValidationError(
                "timers.resv_recheck_seconds must be in (0, 3600]".to_string(),
            ));
        }

        for (key, value) in [
            ("signals.terminate", &self.signals.terminate),
            ("signals.kill", &self.signals.kill),
            ("signals.fallback", &self.signals.fallback),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} must not be empty",
                    key
                )));
            }
        }

        if self.max_local_requests == 0 {
            return Err(ConfigError::ValidationError(
                "max_local_requests must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeleteConfig::default();
        assert_eq!(config.server_name, "batchsrv");
        assert_eq!(config.timers.prerun_retry_seconds, 1);
        assert_eq!(config.timers.resv_recheck_seconds, 30);
        assert_eq!(config.signals.terminate, "TermJob");
        assert_eq!(config.signals.kill, "SIGKILL");
        assert!(config.keep_history);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_value_round_trips() {
        let config = DeleteConfig::default();
        let value = config.to_value();
        assert_eq!(value["timers"]["resv_recheck_seconds"], 30);

        let back: DeleteConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_zero_recheck() {
        let mut config = DeleteConfig::default();
        config.timers.resv_recheck_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("resv_recheck_seconds"));
    }

    #[test]
    fn test_validate_rejects_empty_signal() {
        let mut config = DeleteConfig::default();
        config.signals.fallback = " ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("signals.fallback"));
    }

    #[test]
    fn test_partial_table_uses_defaults() {
        let config: DeleteConfig =
            serde_json::from_value(serde_json::json!({"timers": {"prerun_retry_seconds": 5}}))
                .unwrap();
        assert_eq!(config.timers.prerun_retry_seconds, 5);
        assert_eq!(config.timers.resv_recheck_seconds, 30);
        assert_eq!(config.server_name, "batchsrv");
    }
}
