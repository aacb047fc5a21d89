//! Lifecycle states and the word guarded by the lifecycle lock.

use std::fmt;
use std::time::{Duration, Instant};

use crate::errors::ExecutionError;

use super::exit_code::ExitCode;

/// Run status of the application instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No run cycle is active; a new one may start.
    #[default]
    Idle,
    /// The pipeline is starting.
    Starting,
    /// An exit was requested while starting; it takes effect before running.
    StartingExitRequested,
    /// Up, but the asynchronous caller has not yet observed it.
    StartingAsyncWait,
    /// Up and running until a stop is requested.
    Running,
    /// A stop has been recorded and the pipeline is unwinding.
    Stopping,
    /// Stopped; the asynchronous caller has not yet collected the outcome.
    StoppingAsyncWait,
    /// Forced out-of-band exit in progress.
    AsyncExit,
    /// Terminal; no further run cycle can start.
    Dead,
}

impl LifecycleState {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::StartingExitRequested => "starting_exit_requested",
            Self::StartingAsyncWait => "starting_async_wait",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::StoppingAsyncWait => "stopping_async_wait",
            Self::AsyncExit => "async_exit",
            Self::Dead => "dead",
        }
    }

    /// Returns `true` for states in which the recorded exit code is trusted.
    #[must_use]
    pub const fn has_exit_code(self) -> bool {
        matches!(self, Self::Stopping | Self::StoppingAsyncWait)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing marks recorded by lifecycle transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    first_start: Option<Instant>,
    start: Option<Instant>,
    stop: Option<Instant>,
}

impl Timing {
    /// When the first run cycle of this process started.
    #[must_use]
    pub const fn first_start(&self) -> Option<Instant> {
        self.first_start
    }

    /// When the current or most recent cycle (including restarts) started.
    #[must_use]
    pub const fn start(&self) -> Option<Instant> {
        self.start
    }

    /// When the most recent cycle stopped, if it has.
    #[must_use]
    pub const fn stop(&self) -> Option<Instant> {
        self.stop
    }

    /// Time between the latest start and the stop that followed it.
    ///
    /// `None` while the cycle is still running.
    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        let start = self.start?;
        let stop = self.stop?;
        stop.checked_duration_since(start)
    }

    pub(super) fn mark_first_start(&mut self) {
        let now = Instant::now();
        self.first_start = Some(now);
        self.start = Some(now);
        self.stop = None;
    }

    pub(super) fn mark_start(&mut self) {
        self.start = Some(Instant::now());
        self.stop = None;
    }

    pub(super) fn mark_stop(&mut self) {
        self.stop = Some(Instant::now());
    }
}

/// State, exit code and async flag mutated as one unit under the lock.
#[derive(Debug, Default)]
pub(super) struct Word {
    pub(super) state: LifecycleState,
    pub(super) exit_code: ExitCode,
    pub(super) is_async: bool,
    /// Set by an asynchronous start until the caller observes the app up.
    pub(super) awaiting_up: bool,
    pub(super) timing: Timing,
    /// Failure of the last asynchronous cycle, reaped by the waiting caller.
    pub(super) pending: Option<ExecutionError>,
}

impl Word {
    pub(super) const fn stop_with(&mut self, code: ExitCode) {
        self.state = LifecycleState::Stopping;
        self.exit_code = code;
    }

    /// Back to idle; the async flag only lives for one run cycle.
    pub(super) const fn reset_idle(&mut self) {
        self.state = LifecycleState::Idle;
        self.exit_code = ExitCode::OK;
        self.is_async = false;
        self.awaiting_up = false;
    }

    pub(super) fn enter(&mut self, state: LifecycleState) {
        self.state = state;
        self.exit_code = ExitCode::OK;
        self.is_async = false;
        self.awaiting_up = false;
        self.pending = None;
    }
}
