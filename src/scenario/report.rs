//! Scenario report (JSON or human-readable)

use chrono::{DateTime, Utc};
use serde::Serialize;

use batchdel_agent::AgentCall;

use crate::effects::{AccountRecord, HookEvent, MailMessage};
use crate::server::{ClientReply, Server};
use crate::state::{JobState, JobSubstate, ReservationState};
use crate::transport::PeerMessage;

/// Schema version for the scenario report
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for the scenario report
pub const REPORT_SCHEMA_ID: &str = "batchdel/scenario_report@1";

/// Final state of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRow {
    pub id: String,
    pub state: JobState,
    pub substate: JobSubstate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// `terminated/total` for array parents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subjobs_done: Option<String>,
}

/// Final state of one reservation.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationRow {
    pub id: String,
    pub state: ReservationState,
    pub down_counter: usize,
}

/// Everything a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub schema_version: u32,
    pub schema_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,

    pub steps_run: usize,
    /// Virtual seconds elapsed.
    pub elapsed_seconds: i64,

    pub replies: Vec<ClientReply>,
    pub jobs: Vec<JobRow>,
    pub reservations: Vec<ReservationRow>,

    pub accounting: Vec<AccountRecord>,
    pub mail: Vec<MailMessage>,
    pub hooks: Vec<(HookEvent, String)>,
    pub agent_calls: Vec<AgentCall>,
    pub peer_messages: Vec<PeerMessage>,

    /// Tasks still registered when the timeline ended.
    pub tasks_pending: usize,
}

impl ScenarioReport {
    /// Snapshot the server's records and replies.
    pub(crate) fn capture(name: &str, steps_run: usize, server: &Server) -> Self {
        let store = server.store();
        let jobs = store
            .job_ids()
            .iter()
            .filter_map(|id| store.job(id))
            .map(|job| JobRow {
                id: job.id.clone(),
                state: job.state,
                substate: job.substate,
                exit_status: job.exit_status,
                comment: job.comment.clone(),
                subjobs_done: job
                    .array
                    .as_ref()
                    .map(|a| format!("{}/{}", a.terminated_count(), a.total_count())),
            })
            .collect();
        let reservations = store
            .reservation_ids()
            .iter()
            .filter_map(|id| store.reservation(id))
            .map(|resv| ReservationRow {
                id: resv.id.clone(),
                state: resv.state,
                down_counter: resv.down_counter,
            })
            .collect();

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            steps_run,
            elapsed_seconds: server.scheduler().elapsed_seconds(),
            replies: server.replies().to_vec(),
            jobs,
            reservations,
            accounting: Vec::new(),
            mail: Vec::new(),
            hooks: Vec::new(),
            agent_calls: Vec::new(),
            peer_messages: Vec::new(),
            tasks_pending: server.scheduler().len(),
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering for terminals.
    pub fn human(&self) -> String {
        let mut out = format!(
            "scenario {} ({} steps, {}s virtual)\n",
            if self.name.is_empty() { "-" } else { &self.name },
            self.steps_run,
            self.elapsed_seconds
        );
        out.push_str("replies:\n");
        for reply in &self.replies {
            out.push_str(&format!("  {} {}: {}\n", reply.request, reply.target, reply.reply));
        }
        out.push_str("jobs:\n");
        for job in &self.jobs {
            out.push_str(&format!("  {} {}/{}", job.id, job.state, job.substate));
            if let Some(done) = &job.subjobs_done {
                out.push_str(&format!(" subjobs {}", done));
            }
            out.push('\n');
        }
        if !self.reservations.is_empty() {
            out.push_str("reservations:\n");
            for resv in &self.reservations {
                out.push_str(&format!("  {} {} ({} resident)\n", resv.id, resv.state, resv.down_counter));
            }
        }
        out.push_str(&format!(
            "accounting records: {}, mail: {}, peer messages: {}, tasks pending: {}\n",
            self.accounting.len(),
            self.mail.len(),
            self.peer_messages.len(),
            self.tasks_pending
        ));
        out
    }
}
