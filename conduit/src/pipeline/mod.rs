//! Pipeline specifications and the seams to the dashboard.
//!
//! This module provides:
//! - Pipeline specs, babysitter policies and sequences
//! - Stage window evaluation
//! - Reader/trigger/session traits implemented by the dashboard adapter
//! - Bounded waits for a stage to pass

mod ports;
mod spec;
mod wait;
mod window;

pub use ports::{with_session, PipelineControl, PipelineTrigger, SessionProvider, StageReader};
pub use spec::{BabysitterPolicy, PipelineSequence, PipelineSpec, PipelineStep, RerunStrategy};
pub use wait::{await_stage_passed, run_with_timeout, WaitLimits};
pub use window::{evaluate_window, stage_window, WindowVerdict};
