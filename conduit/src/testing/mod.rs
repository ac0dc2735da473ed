//! Testing utilities for conduit orchestration.
//!
//! This module provides:
//! - A scripted dashboard implementing the pipeline ports
//! - A session provider handing out sessions on that dashboard
//! - A browser driver with a fixed page, for adapter tests

mod mocks;

pub use mocks::{DashboardAction, FakeDashboard, FakeDriver, FakeSessions};
