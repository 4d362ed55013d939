//! Array subjob tracking table.
//!
//! Entries are ordered by numeric index; their position is the offset.
//! `terminated_count` always equals the number of done entries.

use batchdel_jobid::IndexRange;
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::state::{JobState, JobSubstate, TerminalState};

/// Tracked state of one subjob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjobEntry {
    pub index: u32,
    pub state: JobState,
    pub substate: JobSubstate,
}

impl SubjobEntry {
    pub fn is_done(&self) -> bool {
        self.substate.is_terminal()
    }
}

/// Per-array table of subjob states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayTracking {
    entries: Vec<SubjobEntry>,
    terminated: usize,
    #[serde(skip)]
    guard: bool,
}

impl ArrayTracking {
    /// Table with every index queued.
    pub fn new(indices: impl IntoIterator<Item = u32>) -> Self {
        let mut indices: Vec<u32> = indices.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();
        Self {
            entries: indices
                .into_iter()
                .map(|index| SubjobEntry {
                    index,
                    state: JobState::Queued,
                    substate: JobSubstate::Queued,
                })
                .collect(),
            terminated: 0,
            guard: false,
        }
    }

    pub fn from_range(range: IndexRange) -> Self {
        Self::new(range.indices())
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    pub fn terminated_count(&self) -> usize {
        self.terminated
    }

    /// Highest index in the table.
    pub fn max_index(&self) -> Option<u32> {
        self.entries.last().map(|e| e.index)
    }

    /// Offset of a numeric index.
    pub fn offset_of(&self, index: u32) -> Option<usize> {
        self.entries.binary_search_by_key(&index, |e| e.index).ok()
    }

    pub fn entry(&self, offset: usize) -> Option<&SubjobEntry> {
        self.entries.get(offset)
    }

    pub fn entries(&self) -> &[SubjobEntry] {
        &self.entries
    }

    /// Update one entry, keeping the terminated count in step.
    pub fn set_entry(&mut self, offset: usize, state: JobState, substate: JobSubstate) -> bool {
        let Some(entry) = self.entries.get_mut(offset) else {
            return false;
        };
        let was_done = entry.is_done();
        entry.state = state;
        entry.substate = substate;
        match (was_done, entry.is_done()) {
            (false, true) => self.terminated += 1,
            (true, false) => self.terminated -= 1,
            _ => {}
        }
        true
    }

    /// Every entry is done.
    pub fn is_done(&self) -> bool {
        self.terminated == self.entries.len()
    }

    /// Set the structural guard; fails if an iteration is already running.
    pub fn begin_iteration(&mut self) -> Result<(), StoreError> {
        if self.guard {
            return Err(StoreError::ArrayBusy);
        }
        self.guard = true;
        Ok(())
    }

    pub fn end_iteration(&mut self) {
        self.guard = false;
    }

    pub fn is_guarded(&self) -> bool {
        self.guard
    }
}
