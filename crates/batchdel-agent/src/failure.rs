//! Failure injection for the simulated agent.
//!
//! Supports per-operation failures, either delivered in the asynchronous
//! reply or raised immediately at issue time.

use batchdel_protocol::ReasonCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Agent operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOp {
    Signal,
    RemoveStaged,
    Route,
    AbortRoute,
}

/// Failure configuration for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureConfig {
    /// Code reported by the failure.
    pub code: ReasonCode,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Fail at issue time instead of in the reply.
    #[serde(default)]
    pub immediate: bool,
    /// Number of times to fail before succeeding (None = always fail).
    #[serde(default)]
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// A failure delivered in the agent's reply.
    pub fn reply(code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            immediate: false,
            fail_count: None,
        }
    }

    /// The agent cannot be reached at all.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            code: ReasonCode::System,
            message: message.into(),
            immediate: true,
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding.
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Failure injector for the simulated agent.
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<AgentOp, FailureConfig>,
    call_counts: HashMap<AgentOp, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation, resetting its call count.
    pub fn inject(&mut self, op: AgentOp, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    pub fn clear_op(&mut self, op: AgentOp) {
        self.configs.remove(&op);
        self.call_counts.remove(&op);
    }

    /// Check whether this call to `op` should fail.
    pub fn check(&mut self, op: AgentOp) -> Option<FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if let Some(limit) = config.fail_count {
            if *count > limit {
                return None;
            }
        }
        Some(config.clone())
    }
}
