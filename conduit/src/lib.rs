//! # Conduit
//!
//! Drives ordered sequences of CI pipelines on a GoCD-style dashboard and
//! keeps every started pipeline alive with a background babysitter.
//!
//! Conduit provides:
//!
//! - **Sequence execution**: serial and parallel steps, each advancing once a
//!   minimum completion stage has passed
//! - **Babysitting**: per-pipeline polling that reruns failed stages or whole
//!   pipelines after a delay, through isolated browser sessions
//! - **Quiescence**: a shutdown barrier that waits for every babysitter
//! - **Dashboard adapter**: login by cookie injection, stage reading and
//!   triggering over a browser automation driver
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//!
//! let config = ConduitConfig::from_json_file("conduit.json")?;
//! init_logging(&config.logging)?;
//!
//! let orchestrator = Orchestrator::connect(factory, credentials, &config).await?;
//! let sequence = PipelineSequence::new()
//!     .then(PipelineSpec::new("BuildSE").with_minimum_completion_stage("compile"))
//!     .then_parallel([
//!         PipelineSpec::new("DeployDBs")
//!             .with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunStage)),
//!         PipelineSpec::new("UpdateDNS"),
//!     ]);
//!
//! orchestrator.run_sequence(&"42".into(), &sequence).await?;
//! let report = orchestrator.shutdown().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod babysitter;
pub mod config;
pub mod core;
pub mod dashboard;
pub mod driver;
pub mod errors;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod sequence;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{
        Cookie, CredentialProvider, JsonCookieFile, SameSite, StaticCredentialProvider,
    };
    pub use crate::babysitter::{Babysitter, QuiescenceReport, SitterOutcome, SitterTracker};
    pub use crate::config::{ConduitConfig, DashboardConfig, OrchestratorConfig, RecoveryBounds};
    pub use crate::core::{InstanceNumber, StageState, StageStatus};
    pub use crate::dashboard::DashboardControl;
    pub use crate::driver::{AutomationDriver, DriverFactory, DriverSessionProvider, Locator};
    pub use crate::errors::ConduitError;
    pub use crate::observability::{init_logging, LogConfig, LogFormat};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::pipeline::{
        BabysitterPolicy, PipelineControl, PipelineSequence, PipelineSpec, PipelineStep,
        PipelineTrigger, RerunStrategy, SessionProvider, StageReader,
    };
    pub use crate::sequence::SequenceExecutor;
}
