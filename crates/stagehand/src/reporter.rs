//! Structured reporting of run-cycle events.

use std::sync::Arc;
use std::time::Duration;

use crate::LIFECYCLE_TARGET;
use crate::errors::ExecutionError;
use crate::lifecycle::ExitCode;

/// Observer trait used to surface run-cycle events to telemetry sinks.
///
/// Reporters are always invoked outside the lifecycle lock.
pub trait LifecycleReporter: Send + Sync {
    /// Invoked after a run cycle has been admitted.
    fn run_starting(&self, asynchronous: bool);

    /// Invoked once the pipeline has unwound with an exit code.
    fn run_stopped(&self, code: ExitCode, uptime: Option<Duration>);

    /// Invoked when a failure escaped the pipeline.
    fn run_failed(&self, error: &ExecutionError);

    /// Invoked before the pipeline is re-entered for an in-place restart.
    fn restarting(&self, attempt: u32, code: ExitCode);

    /// Invoked when the run ended through an asynchronous exit.
    fn async_exit(&self);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn run_starting(&self, asynchronous: bool) {
        (**self).run_starting(asynchronous);
    }

    fn run_stopped(&self, code: ExitCode, uptime: Option<Duration>) {
        (**self).run_stopped(code, uptime);
    }

    fn run_failed(&self, error: &ExecutionError) {
        (**self).run_failed(error);
    }

    fn restarting(&self, attempt: u32, code: ExitCode) {
        (**self).restarting(attempt, code);
    }

    fn async_exit(&self) {
        (**self).async_exit();
    }
}

/// Default reporter that records run-cycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn run_starting(&self, asynchronous: bool) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "run_starting",
            asynchronous,
            "starting application"
        );
    }

    fn run_stopped(&self, code: ExitCode, uptime: Option<Duration>) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "run_stopped",
            exit_code = code.get(),
            uptime = ?uptime,
            "application stopped"
        );
    }

    fn run_failed(&self, error: &ExecutionError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "run_failed",
            error = %error,
            "application failed"
        );
    }

    fn restarting(&self, attempt: u32, code: ExitCode) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "restarting",
            attempt,
            exit_code = code.get(),
            "restarting application in place"
        );
    }

    fn async_exit(&self) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "async_exit",
            "application was asynchronously exited"
        );
    }
}
