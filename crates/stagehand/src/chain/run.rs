//! Synchronous and asynchronous entry points.

use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::info;

use crate::CHAIN_TARGET;
use crate::context::Context;
use crate::errors::ExecutionError;
use crate::lifecycle::{ExitCode, ExitStatus, Lifecycle};

use super::{Chain, ProcessTerminator, Terminator};

const WORKER_THREAD_NAME: &str = "stagehand-worker";

impl Chain {
    /// Runs the pipeline on the calling thread and terminates the process
    /// with the resulting exit code.
    pub fn start_and_exit(&self, context: Context) -> ! {
        let code = self.start_and_exit_with(context, &ProcessTerminator);
        process::exit(i32::from(code))
    }

    /// As [`Chain::start_and_exit`], handing the exit code to `terminator`
    /// once the state machine has returned to idle.
    ///
    /// Returns the code only when `terminator` itself returns.
    pub fn start_and_exit_with(&self, context: Context, terminator: &dyn Terminator) -> ExitCode {
        let code = self.run_to_completion(&context);
        info!(
            target: CHAIN_TARGET,
            exit_code = code.get(),
            "terminating process"
        );
        terminator.terminate(code);
        code
    }

    fn run_to_completion(&self, context: &Context) -> ExitCode {
        let lifecycle = self.lifecycle();
        let reporter = self.reporter();
        if let Err(error) = lifecycle.first_start(false) {
            report_failure(self, &error);
            return ExitCode::EXCEPTION;
        }
        reporter.run_starting(false);
        let outcome = self.proceed(context);
        let recorded = lifecycle.exit_code();
        let code = match outcome {
            Ok(code) => recorded.unwrap_or(code),
            Err(error) if error.is_async_exit() => {
                reporter.async_exit();
                ExitCode::EXCEPTION
            }
            Err(error) => {
                reporter.run_failed(&error);
                recorded.unwrap_or(ExitCode::EXCEPTION)
            }
        };
        reporter.run_stopped(code, lifecycle.timing().uptime());
        lifecycle.last_stop();
        code
    }

    /// Runs the pipeline on a dedicated worker thread and blocks until the
    /// application is up, has failed, or has exited before ever running.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::AlreadyRunning`] when a cycle is active,
    /// [`ExecutionError::Failed`] when startup failed (including a worker
    /// that could not be spawned), and the asynchronous-exit signal when the
    /// run was forced out before coming up.
    pub fn start_asynchronously(&self, context: Context) -> Result<AsyncRun, ExecutionError> {
        let lifecycle = Arc::clone(self.lifecycle());
        lifecycle.first_start(true)?;
        self.reporter().run_starting(true);

        let chain = self.clone();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || chain.run_worker(&context));
        let worker = match spawned {
            Ok(worker) => Some(worker),
            Err(source) => {
                let failure = lifecycle.stopping_exception(ExecutionError::Spawn {
                    source: Arc::new(source),
                });
                self.reporter().run_failed(&failure);
                lifecycle.last_stop_with_failure(failure);
                None
            }
        };

        lifecycle.await_server_up()?;
        worker.map_or(Err(ExecutionError::NotStarting), |worker| {
            Ok(AsyncRun { lifecycle, worker })
        })
    }

    fn run_worker(&self, context: &Context) {
        let lifecycle = self.lifecycle();
        let reporter = self.reporter();
        match self.proceed(context) {
            Ok(code) => {
                let code = lifecycle.exit_code().unwrap_or(code);
                reporter.run_stopped(code, lifecycle.timing().uptime());
                lifecycle.last_stop();
            }
            Err(error) if error.is_async_exit() => {
                reporter.async_exit();
                lifecycle.last_stop();
            }
            Err(error) => {
                reporter.run_failed(&error);
                lifecycle.last_stop_with_failure(error);
            }
        }
    }
}

fn report_failure(chain: &Chain, error: &ExecutionError) {
    if error.is_async_exit() {
        chain.reporter().async_exit();
    } else {
        chain.reporter().run_failed(error);
    }
}

/// Handle on a pipeline running on its worker thread.
#[derive(Debug)]
pub struct AsyncRun {
    lifecycle: Arc<Lifecycle>,
    worker: JoinHandle<()>,
}

impl AsyncRun {
    /// State machine driven by the worker.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Requests that the running application exit with `code`.
    pub fn request_exit(&self, code: ExitCode) -> bool {
        self.lifecycle.request_exit(code)
    }

    /// Blocks until the run cycle finishes; see [`Lifecycle::await_exit`].
    ///
    /// # Errors
    ///
    /// Returns the failure of the cycle or the asynchronous-exit signal.
    pub fn await_exit(&self) -> Result<ExitStatus, ExecutionError> {
        self.lifecycle.await_exit()
    }

    /// Returns `true` once the worker thread has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the worker thread to return.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Panicked`] when the worker panicked.
    pub fn join(self) -> Result<(), ExecutionError> {
        self.worker
            .join()
            .map_err(|payload| ExecutionError::from_panic(WORKER_THREAD_NAME, payload.as_ref()))
    }
}
