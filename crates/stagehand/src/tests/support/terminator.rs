//! Terminator that records the machine state instead of exiting.

use std::sync::{Arc, Mutex};

use crate::{ExitCode, Lifecycle, LifecycleState, Terminator};

/// Captures each termination request with the state observed at that moment.
#[derive(Debug)]
pub struct RecordingTerminator {
    lifecycle: Arc<Lifecycle>,
    calls: Mutex<Vec<(ExitCode, LifecycleState)>>,
}

impl RecordingTerminator {
    pub fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(ExitCode, LifecycleState)> {
        self.calls
            .lock()
            .expect("terminator mutex poisoned")
            .clone()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, code: ExitCode) {
        let state = self.lifecycle.state();
        self.calls
            .lock()
            .expect("terminator mutex poisoned")
            .push((code, state));
    }
}
