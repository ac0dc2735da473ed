//! Babysitters: background tasks that watch one pipeline instance until it
//! passes, rerunning failures per policy.
//!
//! This module provides:
//! - `Babysitter`, the per-pipeline polling/recovery state machine
//! - `SitterTracker`, the active-sitter counter and shutdown barrier

mod sitter;
mod tracker;

pub use sitter::{Babysitter, SitterOutcome, SitterState};
pub use tracker::{QuiescenceReport, SitterGuard, SitterTracker};
