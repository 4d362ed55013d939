//! Single-threaded scheduler with a virtual clock.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::fmt;

use batchdel_protocol::{ExchangeId, Reply, SignalReply};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use super::{Continuation, Owner, TaskEvent, Trigger};
use crate::request::RequestId;

/// Largest single clock step, roughly ten years.
const MAX_STEP_SECONDS: u64 = 10 * 365 * 24 * 3600;

/// Identifier of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug)]
struct Task {
    owner: Owner,
    trigger: Trigger,
    continuation: Continuation,
}

/// A continuation ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyTask {
    pub id: TaskId,
    pub owner: Owner,
    pub continuation: Continuation,
    pub event: TaskEvent,
}

/// Timer queue plus event waiters.
///
/// Cancelled tasks are dropped from the task map only; queue entries that
/// no longer resolve are skipped when reached.
#[derive(Debug)]
pub struct Scheduler {
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    next_id: u64,
    tasks: BTreeMap<TaskId, Task>,
    ready: VecDeque<(TaskId, TaskEvent)>,
    timed: BinaryHeap<Reverse<(DateTime<Utc>, TaskId)>>,
    exchange_waiters: BTreeMap<ExchangeId, Vec<TaskId>>,
    reply_waiters: BTreeMap<RequestId, Vec<TaskId>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }
}

impl Scheduler {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            now: start,
            next_id: 0,
            tasks: BTreeMap::new(),
            ready: VecDeque::new(),
            timed: BinaryHeap::new(),
            exchange_waiters: BTreeMap::new(),
            reply_waiters: BTreeMap::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Virtual seconds since the scheduler was created.
    pub fn elapsed_seconds(&self) -> i64 {
        (self.now - self.start).num_seconds()
    }

    /// Deadline `seconds` from now.
    pub fn deadline_in(&self, seconds: u64) -> DateTime<Utc> {
        self.now + step(seconds)
    }

    pub fn register(&mut self, owner: Owner, trigger: Trigger, continuation: Continuation) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        trace!(task = %id, ?owner, ?trigger, task_kind = continuation.name(), "task registered");

        match trigger {
            Trigger::Immediate => self.ready.push_back((id, TaskEvent::Wake)),
            Trigger::At(deadline) => self.timed.push(Reverse((deadline, id))),
            Trigger::Exchange(exchange) => {
                self.exchange_waiters.entry(exchange).or_default().push(id)
            }
            Trigger::RequestReply(request) => {
                self.reply_waiters.entry(request).or_default().push(id)
            }
        }
        self.tasks.insert(
            id,
            Task {
                owner,
                trigger,
                continuation,
            },
        );
        id
    }

    /// Register a task that fires `seconds` from now.
    pub fn register_after(
        &mut self,
        owner: Owner,
        seconds: u64,
        continuation: Continuation,
    ) -> TaskId {
        let deadline = self.deadline_in(seconds);
        self.register(owner, Trigger::At(deadline), continuation)
    }

    /// De-register one task.
    pub fn cancel(&mut self, id: TaskId) -> Option<Continuation> {
        self.tasks.remove(&id).map(|task| task.continuation)
    }

    /// De-register every task bound to `owner`.
    pub fn cancel_owner(&mut self, owner: &Owner) -> Vec<Continuation> {
        let ids: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, task)| &task.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        if !ids.is_empty() {
            debug!(?owner, count = ids.len(), "cancelling owner tasks");
        }
        ids.into_iter().filter_map(|id| self.cancel(id)).collect()
    }

    /// Number of live tasks bound to `owner`.
    pub fn count_for(&self, owner: &Owner) -> usize {
        self.tasks.values().filter(|task| &task.owner == owner).count()
    }

    /// Live tasks waiting on `exchange`.
    pub fn waiting_on(&self, exchange: ExchangeId) -> usize {
        self.exchange_waiters
            .get(&exchange)
            .map(|ids| ids.iter().filter(|id| self.tasks.contains_key(id)).count())
            .unwrap_or(0)
    }

    /// Resume every task waiting on a signal exchange.
    pub fn on_signal_reply(&mut self, exchange: ExchangeId, reply: SignalReply) -> usize {
        self.wake_exchange(exchange, TaskEvent::Signal(reply))
    }

    /// Resume every task waiting on a route exchange.
    pub fn on_route_done(&mut self, exchange: ExchangeId, delivered: bool) -> usize {
        self.wake_exchange(exchange, TaskEvent::Route { delivered })
    }

    fn wake_exchange(&mut self, exchange: ExchangeId, event: TaskEvent) -> usize {
        let ids = self.exchange_waiters.remove(&exchange).unwrap_or_default();
        self.wake(ids, event)
    }

    /// Resume every task waiting on the reply to `request`.
    pub fn on_request_reply(&mut self, request: RequestId, reply: Reply) -> usize {
        let ids = self.reply_waiters.remove(&request).unwrap_or_default();
        self.wake(ids, TaskEvent::Reply(reply))
    }

    fn wake(&mut self, ids: Vec<TaskId>, event: TaskEvent) -> usize {
        let mut woken = 0;
        for id in ids {
            if self.tasks.contains_key(&id) {
                self.ready.push_back((id, event.clone()));
                woken += 1;
            }
        }
        woken
    }

    /// Move the clock forward, readying every task whose deadline passed.
    pub fn advance(&mut self, seconds: u64) -> usize {
        self.now = self.now + step(seconds);
        let mut due = 0;
        while let Some(Reverse((deadline, id))) = self.timed.peek().copied() {
            if deadline > self.now {
                break;
            }
            self.timed.pop();
            if self.tasks.contains_key(&id) {
                self.ready.push_back((id, TaskEvent::Wake));
                due += 1;
            }
        }
        if due > 0 {
            debug!(due, elapsed = self.elapsed_seconds(), "timers expired");
        }
        due
    }

    /// Next ready continuation, removed from the registry.
    pub fn pop_ready(&mut self) -> Option<ReadyTask> {
        while let Some((id, event)) = self.ready.pop_front() {
            if let Some(task) = self.tasks.remove(&id) {
                trace!(task = %id, trigger = ?task.trigger, "task ready");
                return Some(ReadyTask {
                    id,
                    owner: task.owner,
                    continuation: task.continuation,
                    event,
                });
            }
        }
        None
    }

    pub fn has_ready(&self) -> bool {
        self.ready.iter().any(|(id, _)| self.tasks.contains_key(id))
    }

    /// Earliest live deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timed
            .iter()
            .filter(|Reverse((_, id))| self.tasks.contains_key(id))
            .map(|Reverse((deadline, _))| *deadline)
            .min()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn step(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_STEP_SECONDS) as i64)
}
