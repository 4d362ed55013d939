//! Termination protocol tests
//!
//! Signal exchange with the execution agent: fallback signals, forced
//! deletes, prerun retries, terminate scripts and route aborts.

mod common;

use batchdel::config::DeleteConfig;
use batchdel::state::{JobState, JobSubstate};
use batchdel::store::{Job, JobFlags, ResourceHold};
use batchdel::transport::PeerMessage;
use batchdel_agent::{AgentCall, AgentOp, FailureConfig, MockAgent};
use batchdel_protocol::{ReasonCode, Reply, KILL_EXIT_STATUS, SIGKILL, SIG_TERMJOB};
use common::{manager, Harness};

// =============================================================================
// Signal exchange
// =============================================================================

#[test]
fn test_running_job_signalled_then_acked() {
    let mut h = Harness::new();
    h.running_job("1.batchsrv", "alice@h1");

    let req = h.submit_delete("1", "alice", Default::default(), None);

    // Suspended until the agent answers.
    assert_eq!(h.reply(req), None);
    let job = h.job("1.batchsrv").unwrap();
    assert!(job.termination_in_progress);
    assert!(job.signal_exchange.is_some());
    assert_eq!(job.comment.as_deref(), Some("Job deleted by alice@h1"));

    h.server.run_until_idle();

    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(h.server.replies_for(req), 1);
    assert_eq!(h.agent.signals_for("1.batchsrv"), vec![SIG_TERMJOB.to_string()]);
    assert_eq!(h.recorder.records_for("1.batchsrv").len(), 1);
    assert_eq!(h.job("1.batchsrv").unwrap().state, JobState::Finished);
}

#[test]
fn test_unknown_signal_falls_back_to_kill() {
    let mut h = Harness::with_agent(MockAgent::new().with_unknown_signal(SIG_TERMJOB));
    h.running_job("2.batchsrv", "alice@h1");

    let req = h.delete("2", "alice");

    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(h.server.replies_for(req), 1);
    assert_eq!(
        h.agent.signals_for("2.batchsrv"),
        vec![SIG_TERMJOB.to_string(), SIGKILL.to_string()]
    );
    assert_eq!(h.recorder.records_for("2.batchsrv").len(), 1);
}

#[test]
fn test_fallback_tried_only_once() {
    let agent = MockAgent::new()
        .with_unknown_signal(SIG_TERMJOB)
        .with_unknown_signal(SIGKILL);
    let mut h = Harness::with_agent(agent);
    h.running_job("3.batchsrv", "alice@h1");

    let req = h.delete("3", "alice");

    assert_eq!(h.reply(req).unwrap().code(), Some(ReasonCode::UnknownSignal));
    assert_eq!(h.agent.signals_for("3.batchsrv").len(), 2);
    assert!(h.recorder.records_for("3.batchsrv").is_empty());
    assert_eq!(h.job("3.batchsrv").unwrap().state, JobState::Running);
}

#[test]
fn test_agent_without_job_finalizes() {
    let mut h = Harness::new();
    // Running on the server, unknown to the agent.
    h.server
        .store_mut()
        .insert_job(Job::new("4.batchsrv", "alice@h1", "workq").with_state(JobState::Running, JobSubstate::Running))
        .unwrap();

    let req = h.delete("4", "alice");

    assert_eq!(h.reply(req), Some(Reply::Ack));
    let job = h.job("4.batchsrv").unwrap();
    assert_eq!(job.state, JobState::Finished);
    assert_eq!(job.resources, ResourceHold::None);
}

#[test]
fn test_prerun_unknown_job_rejected() {
    let mut h = Harness::new();
    h.server
        .store_mut()
        .insert_job(Job::new("5.batchsrv", "alice@h1", "workq").with_state(JobState::Running, JobSubstate::Prerun))
        .unwrap();

    let req = h.delete_with("5", "alice", Default::default(), Some("force"));

    assert_eq!(h.reply(req).unwrap().code(), Some(ReasonCode::UnknownJobId));
    assert_eq!(h.agent.signals_for("5.batchsrv"), vec![SIGKILL.to_string()]);
}

#[test]
fn test_suspended_job_gets_resources_back_before_signal() {
    let mut h = Harness::new();
    h.agent.hold_replies(true);
    let mut job = Job::new("6.batchsrv", "alice@h1", "workq").with_state(JobState::Running, JobSubstate::Suspended);
    job.resources = ResourceHold::Released;
    h.add_job(job);

    let req = h.delete("6", "alice");

    assert_eq!(h.reply(req), None);
    assert_eq!(h.job("6.batchsrv").unwrap().resources, ResourceHold::Held);

    h.agent.hold_replies(false);
    h.server.run_until_idle();
    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(h.job("6.batchsrv").unwrap().resources, ResourceHold::None);
}

// =============================================================================
// Prerun retry
// =============================================================================

#[test]
fn test_prerun_delete_retried_after_start() {
    let mut h = Harness::new();
    h.add_job(Job::new("10.batchsrv", "alice@h1", "workq").with_state(JobState::Running, JobSubstate::Prerun));

    let req = h.delete("10", "alice");
    assert_eq!(h.reply(req), None);
    assert!(h.agent.signals_for("10.batchsrv").is_empty());

    h.server.job_started("10.batchsrv").unwrap();
    h.server.advance(1);

    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(h.server.replies_for(req), 1);
    assert_eq!(h.agent.signals_for("10.batchsrv"), vec![SIG_TERMJOB.to_string()]);
}

#[test]
fn test_prerun_retry_waits_for_timer() {
    let mut h = Harness::new();
    h.add_job(Job::new("11.batchsrv", "alice@h1", "workq").with_state(JobState::Running, JobSubstate::Prerun));

    let req = h.delete("11", "alice");
    h.server.run_until_idle();

    assert_eq!(h.reply(req), None);
    assert_eq!(h.server.scheduler().len(), 1);
}

// =============================================================================
// Forced deletes
// =============================================================================

#[test]
fn test_manager_force_does_not_wait_for_agent() {
    let mut h = Harness::new();
    h.agent
        .inject(AgentOp::Signal, FailureConfig::reply(ReasonCode::System, "mom busy"));
    h.running_job("20.batchsrv", "alice@h1");

    let req = h.submit_delete("20", "root", manager(), Some("force"));

    assert_eq!(h.reply(req), Some(Reply::Ack));
    let job = h.job("20.batchsrv").unwrap();
    assert_eq!(job.state, JobState::Finished);
    assert_eq!(job.exit_status, Some(KILL_EXIT_STATUS));
    assert!(h.agent.calls().contains(&AgentCall::Discard {
        job_id: "20.batchsrv".to_string()
    }));

    // The late failure reply has nobody to answer.
    h.server.run_until_idle();
    assert_eq!(h.server.replies_for(req), 1);
}

#[test]
fn test_force_with_unreachable_agent_acks() {
    let mut h = Harness::new();
    h.agent.inject(AgentOp::Signal, FailureConfig::unreachable("mom down"));
    h.running_job("21.batchsrv", "alice@h1");

    let req = h.delete_with("21", "alice", Default::default(), Some("force"));

    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(h.job("21.batchsrv").unwrap().state, JobState::Finished);
}

#[test]
fn test_unreachable_agent_rejects_plain_delete() {
    let mut h = Harness::new();
    h.agent
        .inject(AgentOp::Signal, FailureConfig::unreachable("mom down").with_fail_count(1));
    h.running_job("22.batchsrv", "alice@h1");

    let req = h.delete("22", "alice");

    assert_eq!(h.reply(req).unwrap().code(), Some(ReasonCode::System));
    let job = h.job("22.batchsrv").unwrap();
    assert_eq!(job.state, JobState::Running);
    // Once set, the flag stays set.
    assert!(job.termination_in_progress);

    // The failed request is gone, so a later delete may proceed.
    let retry = h.delete("22", "alice");
    assert_eq!(h.reply(retry), Some(Reply::Ack));
    assert_eq!(h.job("22.batchsrv").unwrap().state, JobState::Finished);
}

#[test]
fn test_force_on_foreign_job_updates_home_server() {
    let mut h = Harness::new();
    let flags = JobFlags {
        local: false,
        ..JobFlags::default()
    };
    h.add_job(
        Job::new("23.homesrv", "alice@h1", "workq")
            .with_state(JobState::Running, JobSubstate::Running)
            .with_flags(flags),
    );

    let req = h.delete_with("23.homesrv", "root", manager(), Some("force"));

    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(
        h.peers.sent(),
        vec![PeerMessage::Track {
            server: "homesrv".to_string(),
            job_id: "23.homesrv".to_string(),
            state: JobState::Exiting,
        }]
    );
}

#[test]
fn test_forced_exiting_job_is_aborted() {
    let mut h = Harness::new();
    h.add_job(Job::new("24.batchsrv", "alice@h1", "workq").with_state(JobState::Exiting, JobSubstate::Exiting));

    let req = h.delete_with("24", "alice", Default::default(), Some("force"));

    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert!(h.agent.calls().contains(&AgentCall::Discard {
        job_id: "24.batchsrv".to_string()
    }));
    assert_eq!(h.job("24.batchsrv").unwrap().state, JobState::Finished);
}

// =============================================================================
// Terminate script and repeated deletes
// =============================================================================

#[test]
fn test_terminate_script_completes_on_exit_report() {
    let mut h = Harness::with_agent(MockAgent::new().with_terminate_script(true));
    h.running_job("30.batchsrv", "alice@h1");

    let req = h.delete("30", "alice");

    assert_eq!(h.reply(req), Some(Reply::Ack));
    let job = h.job("30.batchsrv").unwrap();
    assert_eq!(job.state, JobState::Exiting);
    assert_eq!(job.substate, JobSubstate::ScriptTerm);

    h.agent.report_exit("30.batchsrv", 0);
    h.server.run_until_idle();
    assert_eq!(h.job("30.batchsrv").unwrap().state, JobState::Finished);
    assert_eq!(h.server.replies_for(req), 1);
}

#[test]
fn test_second_delete_while_signal_outstanding() {
    let mut h = Harness::new();
    h.agent.hold_replies(true);
    h.running_job("31.batchsrv", "alice@h1");

    let first = h.delete("31", "alice");
    let second = h.delete("31", "alice");

    assert_eq!(h.reply(first), None);
    assert_eq!(h.reply(second).unwrap().code(), Some(ReasonCode::BadState));

    h.agent.hold_replies(false);
    h.server.run_until_idle();
    assert_eq!(h.reply(first), Some(Reply::Ack));
    assert_eq!(h.agent.signals_for("31.batchsrv").len(), 1);
}

#[test]
fn test_second_delete_while_prerun_retry_pending() {
    let mut h = Harness::new();
    h.add_job(Job::new("32.batchsrv", "alice@h1", "workq").with_state(JobState::Running, JobSubstate::Prerun));

    let first = h.delete("32", "alice");
    let second = h.delete("32", "alice");

    assert_eq!(h.reply(first), None);
    assert_eq!(h.reply(second).unwrap().code(), Some(ReasonCode::BadState));
    let job = h.job("32.batchsrv").unwrap();
    assert!(job.termination_in_progress);
    assert_eq!(job.termination_request, Some(first));

    h.server.job_started("32.batchsrv").unwrap();
    h.server.advance(1);
    assert_eq!(h.reply(first), Some(Reply::Ack));
    assert_eq!(h.server.replies_for(second), 1);
}

// =============================================================================
// Transit
// =============================================================================

#[test]
fn test_transiting_job_route_aborted_then_deleted() {
    let mut h = Harness::new();
    h.queued_job("40.batchsrv", "alice@h1");
    h.server.route_job("40.batchsrv", "remoteq@peer").unwrap();

    let req = h.submit_delete("40", "alice", Default::default(), None);
    assert_eq!(h.reply(req), None);
    assert_eq!(h.job("40.batchsrv").unwrap().substate, JobSubstate::Abort);
    assert!(h.agent.calls().contains(&AgentCall::AbortRoute {
        job_id: "40.batchsrv".to_string()
    }));

    h.server.run_until_idle();
    assert_eq!(h.reply(req), Some(Reply::Ack));
    assert_eq!(h.server.replies_for(req), 1);
    assert_eq!(h.job("40.batchsrv").unwrap().state, JobState::Finished);
}

#[test]
fn test_transit_without_agent_route_is_internal_error() {
    let mut h = Harness::new();
    h.queued_job("41.batchsrv", "alice@h1");
    h.server.route_job("41.batchsrv", "remoteq@peer").unwrap();
    // The route finishes at the agent before the server hears about it.
    assert!(h.agent.complete_route("41.batchsrv", true));

    let req = h.submit_delete("41", "alice", Default::default(), None);

    assert_eq!(h.reply(req).unwrap().code(), Some(ReasonCode::Internal));
    assert!(h.job("41.batchsrv").unwrap().termination_in_progress);

    h.server.run_until_idle();
    assert_eq!(h.job("41.batchsrv").unwrap().state, JobState::Moved);
}

#[test]
fn test_two_deletes_share_one_route_abort() {
    let mut h = Harness::new();
    h.queued_job("42.batchsrv", "alice@h1");
    h.server.route_job("42.batchsrv", "remoteq@peer").unwrap();

    let first = h.submit_delete("42", "alice", Default::default(), None);
    let second = h.submit_delete("42", "alice", Default::default(), None);

    assert_eq!(h.reply(first), None);
    assert_eq!(h.reply(second), None);
    let aborts = h
        .agent
        .calls()
        .into_iter()
        .filter(|c| matches!(c, AgentCall::AbortRoute { .. }))
        .count();
    assert_eq!(aborts, 1);
    let job = h.job("42.batchsrv").unwrap();
    assert!(job.termination_in_progress);
    assert_eq!(job.termination_request, Some(first));

    h.server.run_until_idle();
    assert_eq!(h.reply(first), Some(Reply::Ack));
    assert_eq!(h.reply(second), Some(Reply::Ack));
    assert_eq!(h.server.replies_for(first), 1);
    assert_eq!(h.server.replies_for(second), 1);
    assert_eq!(h.job("42.batchsrv").unwrap().state, JobState::Finished);
    assert_eq!(h.recorder.records_for("42.batchsrv").len(), 1);
}

#[test]
fn test_route_abort_waiter_acked_when_job_purged() {
    let config = DeleteConfig {
        keep_history: false,
        ..DeleteConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.queued_job("43.batchsrv", "alice@h1");
    h.server.route_job("43.batchsrv", "remoteq@peer").unwrap();

    let first = h.submit_delete("43", "alice", Default::default(), None);
    let second = h.submit_delete("43", "alice", Default::default(), Some("deletehist"));
    h.server.run_until_idle();

    assert_eq!(h.reply(first), Some(Reply::Ack));
    assert_eq!(h.reply(second), Some(Reply::Ack));
    assert!(h.job("43.batchsrv").is_none());
    assert!(h.server.scheduler().is_empty());
}
