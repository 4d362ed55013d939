//! batchdel - job and reservation deletion control plane
//!
//! This crate implements the cancellation side of a batch workload
//! manager: classifying delete targets, terminating running jobs through
//! an asynchronous execution-agent protocol, fanning deletes out over job
//! arrays with exactly-once replies, and cascading reservation deletes
//! until their queues drain.

pub mod config;
mod delete;
pub mod effects;
pub mod error;
pub mod logging;
pub mod request;
pub mod scenario;
pub mod server;
pub mod state;
pub mod store;
pub mod task;
pub mod transport;

pub use config::{DeleteConfig, EffectiveConfig};
pub use error::{DeleteError, ErrorClass};
pub use request::{NewRequest, Permission, RequestId};
pub use scenario::{run_scenario, Scenario, ScenarioReport};
pub use server::{ClientReply, Server};
