//! Run lifecycle, options and the events a run emits

use crate::batch::record::ResultRecord;
use crate::proxy::probe::DEFAULT_TIMEOUT_SECS;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    /// Every candidate was tested
    Completed,
    /// Halted after the first working proxy
    Stopped,
    Cancelled,
}

impl RunState {
    /// Finished normally, whether or not it halted early on a success
    pub fn is_completed(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Stopped)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Stopped | RunState::Cancelled
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Stopped => "stopped on first success",
            RunState::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Everything a run reports, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Log(String),
    /// A working proxy
    Row(ResultRecord),
    Progress { percent: u8, status: String },
    /// Input lines not yet tested, in input order
    Remaining(Vec<String>),
    Finished(RunState),
}

/// Final outcome of a run, handed back when it is joined
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub records: Vec<ResultRecord>,
    /// Input line indices that were probed
    pub tested: BTreeSet<usize>,
}

impl RunReport {
    pub fn working(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter().filter(|record| record.is_ok())
    }
}

/// Options for a batch run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Timeout for each probe
    pub timeout: Duration,
    /// Halt as soon as one proxy works
    pub stop_on_first_success: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            stop_on_first_success: true,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stop_on_first_success(mut self, stop: bool) -> Self {
        self.stop_on_first_success = stop;
        self
    }
}
