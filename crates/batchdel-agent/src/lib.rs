//! Simulated execution agent.
//!
//! Implements an in-memory execution agent for exercising the deletion
//! control plane without real compute nodes.
//!
//! # Operations
//!
//! - `signal`: deliver a signal; the reply arrives later through `poll`
//! - `remove_staged_files`: drop staged-in input files
//! - `discard_job`: forget a job the server has finalized
//! - `start_route` / `abort_route` / `complete_route`: in-flight routing
//! - `report_exit`: emit a job-exit event

mod agent;
mod failure;

pub use agent::{AgentCall, AgentError, MockAgent};
pub use failure::{AgentOp, FailureConfig, FailureInjector};
