//! Simulated agent state.
//!
//! Every reply is queued and only becomes visible through [`MockAgent::poll`],
//! so callers observe the same suspension points as with a remote agent.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use batchdel_protocol::{
    exit_status_for_signal, AgentEvent, AuxCode, ExchangeId, ReasonCode, SignalReply,
    SignalRequest, SIG_TERMJOB,
};
use serde::Serialize;
use tracing::debug;

use crate::failure::{AgentOp, FailureConfig, FailureInjector};

/// Errors raised synchronously by the agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("agent unreachable: {0}")]
    Unreachable(String),

    #[error("agent rejected {op:?}: {code}: {message}")]
    Rejected {
        op: AgentOp,
        code: ReasonCode,
        message: String,
    },

    #[error("no route in flight for job {0}")]
    NoRoute(String),
}

impl AgentError {
    fn from_failure(op: AgentOp, failure: FailureConfig) -> Self {
        if failure.immediate && failure.code == ReasonCode::System {
            Self::Unreachable(failure.message)
        } else {
            Self::Rejected {
                op,
                code: failure.code,
                message: failure.message,
            }
        }
    }
}

/// One call received by the agent, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AgentCall {
    Signal { job_id: String, signal: String },
    RemoveStaged { job_id: String },
    Discard { job_id: String },
    Route { job_id: String, destination: String },
    AbortRoute { job_id: String },
}

#[derive(Debug, Default)]
struct AgentInner {
    /// Jobs currently running under this agent, with the signals they received.
    jobs: BTreeMap<String, Vec<String>>,
    /// In-flight routes by job id.
    routes: BTreeMap<String, ExchangeId>,
    unknown_signals: BTreeSet<String>,
    terminate_script: bool,
    exit_on_signal: bool,
    hold: bool,
    outbox: VecDeque<AgentEvent>,
    failures: FailureInjector,
    calls: Vec<AgentCall>,
    next_exchange: u64,
}

impl AgentInner {
    fn next_exchange(&mut self) -> ExchangeId {
        self.next_exchange += 1;
        ExchangeId(self.next_exchange)
    }
}

/// Shared handle to a simulated execution agent.
#[derive(Debug, Clone)]
pub struct MockAgent {
    inner: Arc<Mutex<AgentInner>>,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgent {
    /// Create an agent whose jobs exit once signalled.
    pub fn new() -> Self {
        let inner = AgentInner {
            exit_on_signal: true,
            ..AgentInner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AgentInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Treat `signal` as unsupported.
    pub fn with_unknown_signal(self, signal: impl Into<String>) -> Self {
        self.lock().unknown_signals.insert(signal.into());
        self
    }

    /// Run the site terminate action when the terminate-job signal arrives.
    pub fn with_terminate_script(self, enabled: bool) -> Self {
        self.lock().terminate_script = enabled;
        self
    }

    /// Whether a successfully signalled job reports its exit.
    pub fn with_exit_on_signal(self, enabled: bool) -> Self {
        self.lock().exit_on_signal = enabled;
        self
    }

    /// Start tracking a running job.
    pub fn register_job(&self, job_id: impl Into<String>) {
        self.lock().jobs.entry(job_id.into()).or_default();
    }

    pub fn knows_job(&self, job_id: &str) -> bool {
        self.lock().jobs.contains_key(job_id)
    }

    /// Inject a failure for an operation.
    pub fn inject(&self, op: AgentOp, config: FailureConfig) {
        self.lock().failures.inject(op, config);
    }

    /// Hold queued events back from `poll` until released.
    pub fn hold_replies(&self, hold: bool) {
        self.lock().hold = hold;
    }

    /// Deliver a signal. The reply is queued as an [`AgentEvent::SignalReply`].
    pub fn signal(&self, request: &SignalRequest) -> Result<ExchangeId, AgentError> {
        let mut inner = self.lock();
        inner.calls.push(AgentCall::Signal {
            job_id: request.job_id.clone(),
            signal: request.signal.clone(),
        });

        if let Some(failure) = inner.failures.check(AgentOp::Signal) {
            if failure.immediate {
                return Err(AgentError::from_failure(AgentOp::Signal, failure));
            }
            let exchange = inner.next_exchange();
            inner.outbox.push_back(AgentEvent::SignalReply {
                exchange,
                reply: SignalReply::failure(&request.job_id, failure.code),
            });
            return Ok(exchange);
        }

        let exchange = inner.next_exchange();
        let reply = if inner.unknown_signals.contains(&request.signal) {
            SignalReply::failure(&request.job_id, ReasonCode::UnknownSignal)
        } else if !inner.jobs.contains_key(&request.job_id) {
            SignalReply::failure(&request.job_id, ReasonCode::UnknownJobId)
        } else if request.signal == SIG_TERMJOB && inner.terminate_script {
            SignalReply::success(&request.job_id).with_aux(AuxCode::TerminateScript)
        } else {
            SignalReply::success(&request.job_id)
        };

        let exits = reply.is_success() && reply.aux == AuxCode::None && inner.exit_on_signal;
        if let Some(signals) = inner.jobs.get_mut(&request.job_id) {
            if reply.is_success() {
                signals.push(request.signal.clone());
            }
        }
        debug!(job_id = %request.job_id, signal = %request.signal, %exchange, code = ?reply.code, "agent signal");

        inner.outbox.push_back(AgentEvent::SignalReply { exchange, reply });
        if exits {
            inner.jobs.remove(&request.job_id);
            inner.outbox.push_back(AgentEvent::JobExit {
                job_id: request.job_id.clone(),
                exit_status: exit_status_for_signal(&request.signal),
            });
        }
        Ok(exchange)
    }

    /// Remove a job's staged-in input files.
    pub fn remove_staged_files(&self, job_id: &str) -> Result<(), AgentError> {
        let mut inner = self.lock();
        inner.calls.push(AgentCall::RemoveStaged {
            job_id: job_id.to_string(),
        });
        match inner.failures.check(AgentOp::RemoveStaged) {
            Some(failure) => Err(AgentError::from_failure(AgentOp::RemoveStaged, failure)),
            None => Ok(()),
        }
    }

    /// Forget a job finalized by the server.
    pub fn discard_job(&self, job_id: &str) {
        let mut inner = self.lock();
        inner.calls.push(AgentCall::Discard {
            job_id: job_id.to_string(),
        });
        inner.jobs.remove(job_id);
    }

    /// Begin moving a job towards `destination`.
    pub fn start_route(&self, job_id: &str, destination: &str) -> Result<ExchangeId, AgentError> {
        let mut inner = self.lock();
        inner.calls.push(AgentCall::Route {
            job_id: job_id.to_string(),
            destination: destination.to_string(),
        });
        if let Some(failure) = inner.failures.check(AgentOp::Route) {
            return Err(AgentError::from_failure(AgentOp::Route, failure));
        }
        let exchange = inner.next_exchange();
        inner.routes.insert(job_id.to_string(), exchange);
        Ok(exchange)
    }

    /// Abort an in-flight route; completion is reported as undelivered.
    pub fn abort_route(&self, job_id: &str) -> Result<(), AgentError> {
        let mut inner = self.lock();
        inner.calls.push(AgentCall::AbortRoute {
            job_id: job_id.to_string(),
        });
        if let Some(failure) = inner.failures.check(AgentOp::AbortRoute) {
            return Err(AgentError::from_failure(AgentOp::AbortRoute, failure));
        }
        let exchange = inner
            .routes
            .remove(job_id)
            .ok_or_else(|| AgentError::NoRoute(job_id.to_string()))?;
        inner.outbox.push_back(AgentEvent::RouteDone {
            exchange,
            job_id: job_id.to_string(),
            delivered: false,
        });
        Ok(())
    }

    /// Finish an in-flight route. Returns false when none was in flight.
    pub fn complete_route(&self, job_id: &str, delivered: bool) -> bool {
        let mut inner = self.lock();
        match inner.routes.remove(job_id) {
            Some(exchange) => {
                inner.outbox.push_back(AgentEvent::RouteDone {
                    exchange,
                    job_id: job_id.to_string(),
                    delivered,
                });
                true
            }
            None => false,
        }
    }

    /// Report that a job's processes ended.
    pub fn report_exit(&self, job_id: &str, exit_status: i32) {
        let mut inner = self.lock();
        inner.jobs.remove(job_id);
        inner.outbox.push_back(AgentEvent::JobExit {
            job_id: job_id.to_string(),
            exit_status,
        });
    }

    /// Drain queued events unless replies are held.
    pub fn poll(&self) -> Vec<AgentEvent> {
        let mut inner = self.lock();
        if inner.hold {
            return Vec::new();
        }
        inner.outbox.drain(..).collect()
    }

    /// Number of events waiting to be polled.
    pub fn pending_events(&self) -> usize {
        self.lock().outbox.len()
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<AgentCall> {
        self.lock().calls.clone()
    }

    /// Signals delivered to `job_id`, in order, including rejected ones.
    pub fn signals_for(&self, job_id: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                AgentCall::Signal { job_id: id, signal } if id == job_id => Some(signal.clone()),
                _ => None,
            })
            .collect()
    }
}
