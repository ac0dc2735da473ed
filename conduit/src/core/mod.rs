//! Core domain model types for conduit.
//!
//! This module contains the types shared by every component:
//! - Stage state and the per-poll stage status
//! - The instance number identifying a run

mod instance;
mod status;

pub use instance::InstanceNumber;
pub use status::{StageState, StageStatus};
