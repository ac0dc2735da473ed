//! Adapter from the pipeline ports to the CI dashboard's web UI.

mod branch;
mod control;
pub mod locators;
mod parse;

pub use control::DashboardControl;
pub use parse::{instance_from_heading, parse_stage_title, pipeline_from_heading, subtract_strings};
