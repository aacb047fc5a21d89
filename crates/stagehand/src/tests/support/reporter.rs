//! Test double for [`LifecycleReporter`] that records run-cycle events.

use std::sync::Mutex;
use std::time::Duration;

use crate::{ExecutionError, ExitCode, LifecycleReporter};

/// Run-cycle events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A run cycle was admitted.
    RunStarting { asynchronous: bool },
    /// The pipeline unwound with a code.
    RunStopped(ExitCode),
    /// A failure escaped the pipeline.
    RunFailed(String),
    /// The pipeline is about to run again.
    Restarting { attempt: u32, code: ExitCode },
    /// The run ended through an asynchronous exit.
    AsyncExit,
}

/// Records lifecycle events for assertions.
#[derive(Debug, Default)]
pub struct RecordingLifecycleReporter {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingLifecycleReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events
            .lock()
            .expect("lifecycle reporter mutex poisoned")
            .push(event);
    }
}

impl LifecycleReporter for RecordingLifecycleReporter {
    fn run_starting(&self, asynchronous: bool) {
        self.record(LifecycleEvent::RunStarting { asynchronous });
    }

    fn run_stopped(&self, code: ExitCode, _uptime: Option<Duration>) {
        self.record(LifecycleEvent::RunStopped(code));
    }

    fn run_failed(&self, error: &ExecutionError) {
        self.record(LifecycleEvent::RunFailed(error.to_string()));
    }

    fn restarting(&self, attempt: u32, code: ExitCode) {
        self.record(LifecycleEvent::Restarting { attempt, code });
    }

    fn async_exit(&self) {
        self.record(LifecycleEvent::AsyncExit);
    }
}
