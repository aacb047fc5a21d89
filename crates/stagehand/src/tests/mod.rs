//! Test suites for the lifecycle coordinator.

mod support;
