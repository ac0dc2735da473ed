//! Sequence execution.

mod executor;

pub use executor::SequenceExecutor;
