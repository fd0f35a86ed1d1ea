//! Sequential batch runner: probes candidates one by one and streams events

use crate::batch::cancel::CancellationToken;
use crate::batch::events::{RunEvent, RunOptions, RunReport, RunState};
use crate::batch::record::{RecordStatus, ResultRecord};
use crate::batch::run::BatchRun;
use crate::proxy::models::{ProbeOutcome, ProxyCandidate};
use crate::proxy::parser::CandidateList;
use crate::proxy::probe::GeoProbe;
use crate::timezone::{MatchResult, TimezoneMatcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Why a run could not be started
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("a batch run is already in progress")]
    AlreadyRunning,
    #[error("no valid proxies in the list")]
    NoCandidates,
}

/// Runs one batch at a time against a probe and a timezone matcher
pub struct BatchOrchestrator {
    probe: Arc<dyn GeoProbe>,
    matcher: Arc<TimezoneMatcher>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<RunState>>,
}

impl BatchOrchestrator {
    pub fn new(probe: Arc<dyn GeoProbe>, matcher: Arc<TimezoneMatcher>) -> Self {
        Self {
            probe,
            matcher,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    /// State of the current or most recent run
    pub fn state(&self) -> RunState {
        read_state(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run on a new tokio task.
    ///
    /// Must be called from within a tokio runtime. Nothing is queued: a
    /// second call while a run is active is rejected.
    pub fn start(&self, list: CandidateList, options: RunOptions) -> Result<RunHandle, StartError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(StartError::AlreadyRunning);
        }
        let guard = RunningGuard {
            running: Arc::clone(&self.running),
            state: Arc::clone(&self.state),
            released: false,
        };

        if list.is_empty() {
            return Err(StartError::NoCandidates);
        }

        let run = BatchRun::new(list);
        let run_id = run.run_id();
        write_state(&self.state, RunState::Running);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = RunWorker {
            probe: Arc::clone(&self.probe),
            matcher: Arc::clone(&self.matcher),
            guard,
            options,
            cancel: cancel.clone(),
            events: tx,
        };

        let span = info_span!("batch_run", %run_id);
        let join = tokio::spawn(
            async move { worker.execute(run).await }.instrument(span),
        );

        Ok(RunHandle {
            run_id,
            events: rx,
            cancel,
            join,
        })
    }
}

/// Caller's side of a started run
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next event; `None` once the run has finished and everything was read
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RunEvent> {
        self.events.try_recv().ok()
    }

    /// Ask the run to stop before its next candidate
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end. Unread events are discarded.
    pub async fn join(self) -> Result<RunReport, JoinError> {
        self.join.await
    }
}

/// Holds the running flag for the worker.
///
/// A normal finish releases it before `Finished` is sent, so a caller that
/// reacts to that event can start the next run. If the worker panics, the
/// drop releases it and resets the state to `Idle`.
struct RunningGuard {
    running: Arc<AtomicBool>,
    state: Arc<Mutex<RunState>>,
    released: bool,
}

impl RunningGuard {
    fn release(&mut self, state: RunState) {
        write_state(&self.state, state);
        self.running.store(false, Ordering::SeqCst);
        self.released = true;
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        // After a release the flag may already belong to the next run.
        if self.released {
            return;
        }
        if read_state(&self.state) == RunState::Running {
            write_state(&self.state, RunState::Idle);
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

fn read_state(state: &Mutex<RunState>) -> RunState {
    match state.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

fn write_state(state: &Mutex<RunState>, value: RunState) {
    match state.lock() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

struct RunWorker {
    probe: Arc<dyn GeoProbe>,
    matcher: Arc<TimezoneMatcher>,
    guard: RunningGuard,
    options: RunOptions,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<RunEvent>,
}

impl RunWorker {
    fn emit(&self, event: RunEvent) {
        // The caller may have stopped listening; the run still completes.
        let _ = self.events.send(event);
    }

    fn log(&self, message: String) {
        self.emit(RunEvent::Log(message));
    }

    async fn execute(mut self, mut run: BatchRun) -> RunReport {
        let total = run.total();
        run.set_state(RunState::Running);
        info!(
            total,
            timeout_secs = self.options.timeout.as_secs(),
            stop_first = self.options.stop_on_first_success,
            "batch run started"
        );
        self.log(format!(
            "starting test {} proxies (timeout={}s, stop_first={})",
            total,
            self.options.timeout.as_secs(),
            self.options.stop_on_first_success
        ));
        self.emit(RunEvent::Progress {
            percent: 0,
            status: "Starting".to_string(),
        });

        let candidates = run.candidates().to_vec();
        for (position, candidate) in candidates.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                run.set_state(RunState::Cancelled);
                break;
            }

            let seq = position + 1;
            let shown = candidate.to_simple_string();
            self.log(format!("[{}/{}] {} - checking...", seq, total, shown));

            let outcome = self.probe.probe(Some(&candidate), self.options.timeout).await;
            run.mark_tested(candidate.source_line_index);

            let succeeded = outcome.is_success();
            let record = self.record_for(candidate, outcome).await;
            match &record.status {
                RecordStatus::Ok { geo, matched } => {
                    self.emit(RunEvent::Row(record.clone()));
                    self.log(format!(
                        "{} - OK(200) - {} - {} -> {} - {}ms",
                        shown, geo.country, geo.timezone, matched, record.latency_ms
                    ));
                }
                RecordStatus::Fail { kind } => {
                    self.log(format!(
                        "{} - ERROR({}) - {}ms",
                        shown, kind, record.latency_ms
                    ));
                }
            }
            run.push_record(record);

            let percent = run.progress(seq);
            self.emit(RunEvent::Progress {
                percent,
                status: format!("{}%", percent),
            });
            self.emit(RunEvent::Remaining(run.remaining_lines()));

            if succeeded && self.options.stop_on_first_success {
                self.log("Found alive proxy".to_string());
                run.set_state(RunState::Stopped);
                break;
            }
        }

        if run.state() == RunState::Running {
            run.set_state(RunState::Completed);
        }

        let state = run.state();
        if state.is_completed() {
            self.emit(RunEvent::Progress {
                percent: 100,
                status: "Done".to_string(),
            });
            self.log("Done.".to_string());
        } else {
            self.log(format!(
                "Cancelled after {} of {} proxies.",
                run.records().len(),
                total
            ));
        }

        info!(
            %state,
            tested = run.records().len(),
            working = run.records().iter().filter(|r| r.is_ok()).count(),
            "batch run finished"
        );
        self.guard.release(state);
        self.emit(RunEvent::Finished(state));
        run.into_report()
    }

    async fn record_for(&self, candidate: ProxyCandidate, outcome: ProbeOutcome) -> ResultRecord {
        match outcome {
            ProbeOutcome::Success { geo, latency_ms } => {
                let matched = if geo.has_timezone() {
                    self.match_timezone(&geo.timezone).await
                } else {
                    MatchResult::NoMatch
                };
                ResultRecord::ok(candidate, geo, matched, latency_ms)
            }
            ProbeOutcome::Failure { kind, latency_ms } => {
                ResultRecord::fail(candidate, kind, latency_ms)
            }
        }
    }

    /// The first lookup may enumerate the platform catalog, which can block
    async fn match_timezone(&self, timezone: &str) -> MatchResult {
        let matcher = Arc::clone(&self.matcher);
        let timezone = timezone.to_string();
        match tokio::task::spawn_blocking(move || matcher.match_iana(&timezone)).await {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "timezone lookup task failed");
                MatchResult::NoMatch
            }
        }
    }
}
