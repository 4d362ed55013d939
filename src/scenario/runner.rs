//! Scenario execution against the in-memory store and simulated agent.

use batchdel_agent::MockAgent;
use batchdel_jobid::{parse_index_ranges, IndexRange};
use tracing::{debug, info};

use super::model::{Caller, Scenario, Step};
use super::report::ScenarioReport;
use super::ScenarioError;
use crate::config::DeleteConfig;
use crate::delete::subjob_id;
use crate::effects::Recorder;
use crate::request::{NewRequest, RequestKind};
use crate::server::Server;
use crate::state::JobState;
use crate::store::{ArrayTracking, Job, MemoryStore, Queue, Reservation, Store};
use crate::transport::{AgentLink, RecordingPeers};

/// A server wired to inspectable collaborators.
pub struct ScenarioRunner {
    server: Server,
    agent: MockAgent,
    peers: RecordingPeers,
    recorder: Recorder,
}

impl ScenarioRunner {
    /// Build the server and load the scenario's records.
    pub fn new(scenario: &Scenario, config: DeleteConfig) -> Result<Self, ScenarioError> {
        let mut agent = MockAgent::new()
            .with_exit_on_signal(scenario.agent.exit_on_signal)
            .with_terminate_script(scenario.agent.terminate_script);
        for signal in &scenario.agent.unknown_signals {
            agent = agent.with_unknown_signal(signal.clone());
        }
        for failure in &scenario.agent.failures {
            agent.inject(failure.op, failure.failure.clone());
        }

        let peers = RecordingPeers::new();
        let recorder = Recorder::new();
        let mut runner = Self {
            server: Server::new(
                config,
                Box::new(MemoryStore::new()),
                Box::new(AgentLink::new(agent.clone())),
                Box::new(peers.clone()),
                recorder.effects(),
            ),
            agent,
            peers,
            recorder,
        };
        runner.load(scenario)?;
        Ok(runner)
    }

    fn load(&mut self, scenario: &Scenario) -> Result<(), ScenarioError> {
        for spec in &scenario.queues {
            let mut queue = Queue::new(&spec.name);
            queue.enabled = spec.enabled;
            queue.reservation = spec.reservation.clone();
            self.server.store_mut().insert_queue(queue)?;
        }

        for spec in &scenario.jobs {
            let substate = spec.substate.unwrap_or_else(|| spec.state.default_substate());
            let mut job = Job::new(&spec.id, &spec.owner, &spec.queue)
                .with_state(spec.state, substate)
                .with_flags(spec.flags);
            if let Some(resources) = spec.resources {
                job.resources = resources;
            }
            job.destination = spec.destination.clone();
            self.track_on_agent(&job);
            self.server.store_mut().insert_job(job)?;
        }

        for spec in &scenario.arrays {
            let ranges = parse_index_ranges(&spec.indices)?;
            let table = ArrayTracking::new(ranges.iter().flat_map(IndexRange::indices));
            let mut parent = Job::array_parent(&spec.id, &spec.owner, &spec.queue, table)
                .with_state(spec.state, spec.state.default_substate());

            let mut records = Vec::new();
            for sub in &spec.subjobs {
                let substate = sub.substate.unwrap_or_else(|| sub.state.default_substate());
                let offset = parent
                    .array
                    .as_ref()
                    .and_then(|a| a.offset_of(sub.index))
                    .ok_or_else(|| ScenarioError::Invalid(format!("{} has no index {}", spec.id, sub.index)))?;
                if let Some(array) = parent.array.as_mut() {
                    array.set_entry(offset, sub.state, substate);
                }
                if sub.record {
                    records.push(
                        Job::subjob(&parent, subjob_id(&spec.id, sub.index), sub.index)
                            .with_state(sub.state, substate),
                    );
                }
            }
            self.server.store_mut().insert_job(parent)?;
            for record in records {
                self.track_on_agent(&record);
                self.server.store_mut().insert_job(record)?;
            }
        }

        for spec in &scenario.reservations {
            let mut resv = Reservation::new(&spec.id, &spec.owner, spec.state);
            if let Some(queue) = &spec.queue {
                resv = resv.with_queue(queue);
            }
            resv.wait_expired = spec.wait_expired;
            self.server.store_mut().insert_reservation(resv)?;
            if let Some(submitter) = &spec.submitter {
                let (user, host) = submitter.split_once('@').unwrap_or((submitter.as_str(), "localhost"));
                self.server
                    .attach_submitter(&spec.id, user, host)
                    .map_err(|e| ScenarioError::Invalid(e.to_string()))?;
            }
        }
        debug!(
            jobs = scenario.jobs.len(),
            arrays = scenario.arrays.len(),
            reservations = scenario.reservations.len(),
            "scenario loaded"
        );
        Ok(())
    }

    fn track_on_agent(&self, job: &Job) {
        if matches!(job.state, JobState::Running | JobState::Exiting) {
            self.agent.register_job(&job.id);
        }
    }

    /// Execute one step, then drain whatever it made ready.
    pub fn step(&mut self, index: usize, step: &Step) -> Result<(), ScenarioError> {
        debug!(step = index, action = step.name(), "scenario step");
        let fail = |message: String| ScenarioError::Step {
            index,
            action: step.name(),
            message,
        };
        match step {
            Step::Delete { target, caller } => {
                let kind = RequestKind::DeleteJob {
                    target: target.clone(),
                };
                self.submit(kind, caller);
            }
            Step::DeleteReservation { target, caller } => {
                let kind = RequestKind::DeleteReservation {
                    target: target.clone(),
                };
                self.submit(kind, caller);
            }
            Step::OccurrenceEnd { target, caller } => {
                let kind = RequestKind::ResvOccurrenceEnd {
                    target: target.clone(),
                };
                self.submit(kind, caller);
            }
            Step::Advance { seconds } => {
                self.server.advance(*seconds);
            }
            Step::Run => {}
            Step::JobExit { job, exit_status } => self.agent.report_exit(job, *exit_status),
            Step::JobStarted { job } => {
                self.server.job_started(job).map_err(|e| fail(e.to_string()))?;
            }
            Step::Route { job, destination } => {
                self.server
                    .route_job(job, destination)
                    .map_err(|e| fail(e.to_string()))?;
            }
            Step::RouteDone { job, delivered } => {
                if !self.agent.complete_route(job, *delivered) {
                    return Err(fail(format!("no route in flight for {}", job)));
                }
            }
            Step::HoldReplies { hold } => self.agent.hold_replies(*hold),
        }
        self.server.run_until_idle();
        Ok(())
    }

    fn submit(&mut self, kind: RequestKind, caller: &Caller) {
        let mut new = NewRequest::new(kind, &caller.user, &caller.host).with_perm(caller.perm);
        if let Some(extension) = &caller.extension {
            new = new.with_extension(extension.clone());
        }
        self.server.submit(new);
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn agent(&self) -> &MockAgent {
        &self.agent
    }

    /// Snapshot everything the run produced.
    pub fn report(&self, name: &str, steps_run: usize) -> ScenarioReport {
        let mut report = ScenarioReport::capture(name, steps_run, &self.server);
        report.accounting = self.recorder.records();
        report.mail = self.recorder.mails();
        report.hooks = self.recorder.hooks();
        report.agent_calls = self.agent.calls();
        report.peer_messages = self.peers.sent();
        report
    }
}

/// Load, execute and report a scenario.
pub fn run_scenario(scenario: &Scenario, config: DeleteConfig) -> Result<ScenarioReport, ScenarioError> {
    let mut runner = ScenarioRunner::new(scenario, config)?;
    for (index, step) in scenario.steps.iter().enumerate() {
        runner.step(index, step)?;
    }
    let report = runner.report(&scenario.name, scenario.steps.len());
    info!(
        scenario = %scenario.name,
        steps = scenario.steps.len(),
        replies = report.replies.len(),
        "scenario finished"
    );
    Ok(report)
}
