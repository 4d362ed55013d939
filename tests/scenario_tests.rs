//! Scenario file tests
//!
//! Runs the checked-in scenarios end to end and checks their reports.

mod fixtures;

use batchdel::effects::{AccountKind, HookEvent};
use batchdel::scenario::REPORT_SCHEMA_ID;
use batchdel::state::{JobState, JobSubstate};
use batchdel::Scenario;
use batchdel_agent::AgentCall;
use batchdel_protocol::Reply;
use fixtures::{run_fixture, scenarios_dir};

#[test]
fn test_every_fixture_parses() {
    let mut count = 0;
    for entry in std::fs::read_dir(scenarios_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let scenario = Scenario::load(&path).unwrap();
        assert!(!scenario.name.is_empty(), "{} has no name", path.display());
        assert!(!scenario.steps.is_empty(), "{} has no steps", path.display());
        count += 1;
    }
    assert!(count >= 5);
}

#[test]
fn test_array_deletehist_scenario() {
    let report = run_fixture("array_deletehist");

    assert_eq!(report.schema_id, REPORT_SCHEMA_ID);
    assert_eq!(report.replies.len(), 1);
    assert_eq!(report.replies[0].reply, Reply::Ack);
    assert!(report.jobs.is_empty(), "array left behind: {:?}", report.jobs);
    assert_eq!(report.tasks_pending, 0);
    // Parent plus the running subjob; queued entries have no record to audit.
    assert_eq!(report.accounting.len(), 2);
    assert!(report.mail.is_empty());
}

#[test]
fn test_reservation_drain_scenario() {
    let report = run_fixture("reservation_drain");

    let replies: Vec<&Reply> = report.replies.iter().map(|r| &r.reply).collect();
    assert_eq!(
        replies,
        vec![&Reply::text("R1.batchsrv BEING DELETED"), &Reply::Ack]
    );
    assert!(report.reservations.is_empty());
    assert!(report.jobs.is_empty());
    assert_eq!(report.elapsed_seconds, 60);
    assert_eq!(report.tasks_pending, 0);

    assert!(report
        .accounting
        .iter()
        .any(|r| r.kind == AccountKind::ResvDeletedByServer && r.id == "R1.batchsrv"));
    assert_eq!(report.hooks, vec![(HookEvent::ResvEnd, "R1.batchsrv".to_string())]);
    // Only the reservation owner is mailed; the job deletes are internal.
    assert_eq!(report.mail.len(), 1);
    assert_eq!(report.mail[0].about, "R1.batchsrv");
}

#[test]
fn test_fallback_signal_scenario() {
    let report = run_fixture("fallback_signal");

    assert_eq!(report.replies.len(), 1);
    assert_eq!(report.replies[0].reply, Reply::Ack);
    let signals: Vec<&AgentCall> = report
        .agent_calls
        .iter()
        .filter(|c| matches!(c, AgentCall::Signal { .. }))
        .collect();
    assert_eq!(signals.len(), 2);
    assert_eq!(report.mail.len(), 1);
    assert_eq!(report.mail[0].body, "Job deleted by oper@h2");
    assert_eq!(report.jobs[0].state, JobState::Finished);
}

#[test]
fn test_prerun_retry_scenario() {
    let report = run_fixture("prerun_retry");

    assert_eq!(report.elapsed_seconds, 2);
    assert_eq!(report.replies.len(), 1);
    assert_eq!(report.replies[0].reply, Reply::Ack);
    assert_eq!(report.jobs[0].state, JobState::Finished);
}

#[test]
fn test_transit_abort_scenario() {
    let report = run_fixture("transit_abort");

    assert_eq!(report.replies.len(), 1);
    assert_eq!(report.replies[0].reply, Reply::Ack);
    assert!(report.agent_calls.contains(&AgentCall::AbortRoute {
        job_id: "41.batchsrv".to_string()
    }));
    assert_eq!(report.jobs[0].state, JobState::Finished);
    assert_eq!(report.jobs[0].substate, JobSubstate::Finished);
    assert!(report.peer_messages.is_empty());
}

#[test]
fn test_report_renders_for_humans() {
    let report = run_fixture("array_deletehist");
    let text = report.human();
    assert!(text.starts_with("scenario array_deletehist (1 steps"));
    assert!(text.contains("ACK"));
}
