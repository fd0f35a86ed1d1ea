//! Mutable state of one batch run, owned by its worker task

use crate::batch::events::{RunReport, RunState};
use crate::batch::record::ResultRecord;
use crate::proxy::models::ProxyCandidate;
use crate::proxy::parser::CandidateList;
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug)]
pub struct BatchRun {
    run_id: Uuid,
    lines: Vec<String>,
    candidates: Vec<ProxyCandidate>,
    tested: BTreeSet<usize>,
    records: Vec<ResultRecord>,
    state: RunState,
}

impl BatchRun {
    pub fn new(list: CandidateList) -> Self {
        let (lines, candidates) = list.into_parts();
        Self {
            run_id: Uuid::new_v4(),
            lines,
            candidates,
            tested: BTreeSet::new(),
            records: Vec::new(),
            state: RunState::Idle,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn candidates(&self) -> &[ProxyCandidate] {
        &self.candidates
    }

    pub fn total(&self) -> usize {
        self.candidates.len()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    /// Returns false if the line was already tested
    pub fn mark_tested(&mut self, line_index: usize) -> bool {
        self.tested.insert(line_index)
    }

    pub fn push_record(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Input lines whose index has not been tested, in input order.
    ///
    /// Lines that never parsed are never tested, so they always remain.
    pub fn remaining_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.tested.contains(index))
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Whole-percent progress after `done` candidates
    pub fn progress(&self, done: usize) -> u8 {
        match self.total() {
            0 => 100,
            total => (done.min(total) * 100 / total) as u8,
        }
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            state: self.state,
            records: self.records,
            tested: self.tested,
        }
    }
}
