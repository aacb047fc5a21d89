//! Test harness utilities for the lifecycle behavioural suite.

mod reporter;
mod terminator;
mod world;

pub use reporter::{LifecycleEvent, RecordingLifecycleReporter};
pub use terminator::RecordingTerminator;
pub use world::{TestWorld, world};
