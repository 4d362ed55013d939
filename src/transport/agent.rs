//! Execution agent transport.

use std::fmt;

use batchdel_agent::MockAgent;
use batchdel_protocol::{AgentEvent, ExchangeId, SignalRequest};
use tracing::{debug, warn};

use super::TransportError;

/// Connection to the execution agents.
///
/// Exchanges started here complete later through [`ExecutionAgent::poll`].
pub trait ExecutionAgent: fmt::Debug {
    /// Send a signal; the reply arrives as an event for the returned exchange.
    fn issue_signal(&mut self, request: &SignalRequest) -> Result<ExchangeId, TransportError>;

    /// Ask the agent to remove staged-in files.
    fn remove_staged_files(&mut self, job_id: &str) -> Result<(), TransportError>;

    /// Tell the agent to forget a job.
    fn discard_job(&mut self, job_id: &str);

    /// Start moving a job to `destination`.
    fn route_job(&mut self, job_id: &str, destination: &str) -> Result<ExchangeId, TransportError>;

    /// Abort an in-flight route; its exchange completes undelivered.
    fn abort_route(&mut self, job_id: &str) -> Result<(), TransportError>;

    /// Collect completed exchanges and unsolicited reports.
    fn poll(&mut self) -> Vec<AgentEvent>;
}

/// [`ExecutionAgent`] backed by the simulated agent.
#[derive(Debug, Clone)]
pub struct AgentLink {
    agent: MockAgent,
}

impl AgentLink {
    pub fn new(agent: MockAgent) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &MockAgent {
        &self.agent
    }
}

impl ExecutionAgent for AgentLink {
    fn issue_signal(&mut self, request: &SignalRequest) -> Result<ExchangeId, TransportError> {
        let exchange = self.agent.signal(request).map_err(|e| {
            warn!(job_id = %request.job_id, signal = %request.signal, error = %e, "signal not sent");
            TransportError::from(e)
        })?;
        debug!(job_id = %request.job_id, signal = %request.signal, %exchange, "signal sent");
        Ok(exchange)
    }

    fn remove_staged_files(&mut self, job_id: &str) -> Result<(), TransportError> {
        Ok(self.agent.remove_staged_files(job_id)?)
    }

    fn discard_job(&mut self, job_id: &str) {
        self.agent.discard_job(job_id);
    }

    fn route_job(&mut self, job_id: &str, destination: &str) -> Result<ExchangeId, TransportError> {
        Ok(self.agent.start_route(job_id, destination)?)
    }

    fn abort_route(&mut self, job_id: &str) -> Result<(), TransportError> {
        Ok(self.agent.abort_route(job_id)?)
    }

    fn poll(&mut self) -> Vec<AgentEvent> {
        self.agent.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchdel_agent::{AgentOp, FailureConfig};
    use batchdel_protocol::{ReasonCode, SIGKILL};

    #[test]
    fn test_issue_signal_is_deferred() {
        let agent = MockAgent::new();
        agent.register_job("1.svr");
        agent.hold_replies(true);
        let mut link = AgentLink::new(agent.clone());

        link.issue_signal(&SignalRequest::new("1.svr", SIGKILL)).unwrap();
        assert!(link.poll().is_empty());
        agent.hold_replies(false);
        assert_eq!(link.poll().len(), 2);
    }

    #[test]
    fn test_unreachable_maps_to_system() {
        let agent = MockAgent::new();
        agent.inject(AgentOp::Signal, FailureConfig::unreachable("mom down"));
        let mut link = AgentLink::new(agent);

        let err = link
            .issue_signal(&SignalRequest::new("1.svr", SIGKILL))
            .unwrap_err();
        assert_eq!(err.code(), ReasonCode::System);
    }

    #[test]
    fn test_abort_without_route() {
        let mut link = AgentLink::new(MockAgent::new());
        let err = link.abort_route("3.svr").unwrap_err();
        assert_eq!(err, TransportError::NoExchange("3.svr".to_string()));
        assert_eq!(err.code(), ReasonCode::Internal);
    }
}
