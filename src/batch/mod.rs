//! Batch module for testing a proxy list in order
//!
//! This module provides functionality for:
//! - Probing candidates one at a time, halting on the first success if asked
//! - Streaming log, row, progress and remaining-list events to the caller
//! - Cooperative cancellation between candidates

pub mod cancel;
pub mod events;
pub mod orchestrator;
pub mod record;
pub mod run;

pub use cancel::CancellationToken;
pub use events::{RunEvent, RunOptions, RunReport, RunState};
pub use orchestrator::{BatchOrchestrator, RunHandle, StartError};
pub use record::{RecordStatus, ResultRecord};
pub use run::BatchRun;
