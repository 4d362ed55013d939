//! Scenario files
//!
//! A scenario describes the records a server starts with, how the simulated
//! agent behaves, and a timeline of requests, agent events and clock
//! advances. The CLI `run` command and the integration tests both execute
//! scenarios through [`run_scenario`].

mod model;
mod report;
mod runner;

pub use model::{
    AgentSpec, ArraySpec, Caller, FailureSpec, JobSpec, QueueSpec, ReservationSpec, Scenario,
    Step, SubjobSpec,
};
pub use report::{JobRow, ReservationRow, ScenarioReport, REPORT_SCHEMA_ID, REPORT_SCHEMA_VERSION};
pub use runner::{run_scenario, ScenarioRunner};

use batchdel_jobid::RangeError;
use std::fs;
use std::path::Path;

use crate::store::StoreError;

/// Scenario loading and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("invalid scenario: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bad array indices: {0}")]
    Range(#[from] RangeError),

    #[error("step {index} ({action}) failed: {message}")]
    Step {
        index: usize,
        action: &'static str,
        message: String,
    },
}

impl Scenario {
    /// Parse a scenario from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ScenarioError> {
        toml::from_str(contents).map_err(|e| ScenarioError::Parse(e.to_string()))
    }

    /// Read a scenario file.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// The `[config]` table as a config overlay.
    pub fn config_overlay(&self) -> Result<Option<serde_json::Value>, ScenarioError> {
        self.config
            .as_ref()
            .map(|table| {
                serde_json::to_value(table)
                    .map_err(|e| ScenarioError::Parse(format!("unsupported [config] value: {}", e)))
            })
            .transpose()
    }
}
