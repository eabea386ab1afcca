//! Test data builders and helpers shared across crate test suites.

pub mod builders;
pub mod helpers;

pub use builders::{SampleBuilder, TaskBuilder};
pub use helpers::{init_test_tracing, wait_until};
