//! Process-wide lifecycle state machine.
//!
//! # Transitions
//! ```text
//! Idle ──first_start──▶ Starting ──signal_up──▶ Running ──request_exit──▶ Stopping
//!                          │  ▲                                              │
//!            request_exit  │  └────────────── starting (restart) ────────────┤
//!                          ▼                                                 ▼
//!              StartingExitRequested ──starting──▶ Stopping       last_stop: Idle
//!                                                                 (async: StoppingAsyncWait)
//!
//! any ──signal_async_exit──▶ AsyncExit ──last_stop──▶ Dead
//! ```
//!
//! All transitions take one mutex guarding the [`Word`]; four condition
//! variables carry the wake-ups. Waits are uninterruptible and have no
//! timeout: every blocked caller is released by some other transition.
//! Tracing events are emitted after the guard is released.

mod exit_code;
mod state;

use std::fmt;
use std::panic;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use crate::LIFECYCLE_TARGET;
use crate::errors::ExecutionError;

pub use exit_code::{ExitCode, ExitStatus, StartOutcome};
pub use state::{LifecycleState, Timing};

use state::Word;

/// Panic payload raised when a transition is attempted from a state that the
/// protocol does not allow.
///
/// The chain never converts this payload into an [`ExecutionError`]; it keeps
/// unwinding so the violation surfaces loudly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InconsistentState {
    /// Operation that was attempted.
    pub operation: &'static str,
    /// State the machine was in.
    pub state: LifecycleState,
}

impl fmt::Display for InconsistentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lifecycle operation '{}' is not valid in state '{}'",
            self.operation, self.state
        )
    }
}

/// Authority over run, stop and restart status for one process.
///
/// Construct one instance at process entry and share it through an
/// [`Arc`](std::sync::Arc) with the chain and any thread that needs to
/// request an exit.
#[derive(Debug, Default)]
pub struct Lifecycle {
    word: Mutex<Word>,
    /// Signalled when a stop or an asynchronous exit has been requested.
    stop_requested: Condvar,
    /// Signalled when a cycle has left the stopping or starting states.
    terminated: Condvar,
    /// Signalled when the application came up or gave up starting.
    up: Condvar,
    /// Signalled when an asynchronous start or exit has been collected.
    resolved: Condvar,
}

impl Lifecycle {
    /// Creates an idle state machine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock().state
    }

    /// Recorded exit code, present only once a stop has been recorded.
    #[must_use]
    pub fn exit_code(&self) -> Option<ExitCode> {
        let word = self.lock();
        word.state.has_exit_code().then_some(word.exit_code)
    }

    /// Whether the current cycle was started asynchronously.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.lock().is_async
    }

    /// Snapshot of the timing marks.
    #[must_use]
    pub fn timing(&self) -> Timing {
        self.lock().timing
    }

    /// Begins a run cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::AsyncExit`] once the process has been
    /// asynchronously exited and [`ExecutionError::AlreadyRunning`] when a
    /// cycle is already active.
    pub fn first_start(&self, asynchronous: bool) -> Result<(), ExecutionError> {
        let mut word = self.lock();
        let from = word.state;
        match from {
            LifecycleState::Idle => {
                word.is_async = asynchronous;
                word.awaiting_up = asynchronous;
                word.state = LifecycleState::Starting;
                word.timing.mark_first_start();
                drop(word);
                trace_transition("first_start", from, LifecycleState::Starting);
                Ok(())
            }
            LifecycleState::AsyncExit | LifecycleState::Dead => {
                word.timing.mark_start();
                word.timing.mark_stop();
                Err(ExecutionError::async_exit())
            }
            _ => Err(ExecutionError::AlreadyRunning),
        }
    }

    /// Enters or re-enters the starting state before a stage runs.
    ///
    /// From `Stopping` this is the restart path: the exit code is cleared and
    /// the cycle starts again without leaving the process.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::AsyncExit`] after an asynchronous exit.
    ///
    /// # Panics
    ///
    /// Panics with [`InconsistentState`] when called while running or while
    /// no cycle is active.
    pub fn starting(&self) -> Result<StartOutcome, ExecutionError> {
        let mut word = self.lock();
        let from = word.state;
        match from {
            LifecycleState::Starting => Ok(StartOutcome::Continue),
            LifecycleState::StartingExitRequested => {
                word.state = LifecycleState::Stopping;
                let code = word.exit_code;
                self.up.notify_all();
                drop(word);
                trace_transition("starting", from, LifecycleState::Stopping);
                Ok(StartOutcome::Exit(code))
            }
            LifecycleState::Stopping => {
                word.state = LifecycleState::Starting;
                word.exit_code = ExitCode::OK;
                word.timing.mark_start();
                self.stop_requested.notify_all();
                self.terminated.notify_all();
                drop(word);
                trace_transition("starting", from, LifecycleState::Starting);
                Ok(StartOutcome::Continue)
            }
            LifecycleState::AsyncExit | LifecycleState::Dead => {
                word.timing.mark_stop();
                Err(ExecutionError::async_exit())
            }
            _ => inconsistent("starting", word),
        }
    }

    /// Announces that the application is up, then blocks until a stop is
    /// requested and returns its exit code.
    ///
    /// Returns immediately when an exit was recorded before the application
    /// ever ran.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::AsyncExit`] when the application is forced
    /// out while starting or running.
    ///
    /// # Panics
    ///
    /// Panics with [`InconsistentState`] when no cycle is starting.
    pub fn signal_up_and_await_stop(&self) -> Result<ExitCode, ExecutionError> {
        let mut word = self.lock();
        let from = word.state;
        match from {
            LifecycleState::Starting => {
                let to = if word.awaiting_up {
                    LifecycleState::StartingAsyncWait
                } else {
                    LifecycleState::Running
                };
                word.state = to;
                self.up.notify_all();
                // An await_exit caller parked across a reload must see the
                // cycle land back in the run state.
                self.terminated.notify_all();
                drop(word);
                trace_transition("signal_up", from, to);
                word = self.lock();
            }
            LifecycleState::StartingExitRequested | LifecycleState::Stopping => {
                word.timing.mark_stop();
                word.state = LifecycleState::Stopping;
                self.up.notify_all();
                return Ok(word.exit_code);
            }
            LifecycleState::AsyncExit => {
                word.timing.mark_stop();
                self.up.notify_all();
                return Err(ExecutionError::async_exit());
            }
            _ => inconsistent("signal_up_and_await_stop", word),
        }
        loop {
            match word.state {
                LifecycleState::Running | LifecycleState::StartingAsyncWait => {
                    word = wait(&self.stop_requested, word);
                }
                LifecycleState::Stopping => {
                    word.timing.mark_stop();
                    return Ok(word.exit_code);
                }
                LifecycleState::AsyncExit => {
                    word.timing.mark_stop();
                    return Err(ExecutionError::async_exit());
                }
                _ => inconsistent("signal_up_and_await_stop", word),
            }
        }
    }

    /// Requests that the application exit with `code`.
    ///
    /// Callable from any thread. Returns `false` when no cycle is in a state
    /// that accepts the request (not running, or an exit is already in
    /// progress).
    pub fn request_exit(&self, code: ExitCode) -> bool {
        let mut word = self.lock();
        loop {
            let from = word.state;
            match from {
                LifecycleState::Running => {
                    word.stop_with(code);
                    self.stop_requested.notify_all();
                    drop(word);
                    trace_exit_request(from, LifecycleState::Stopping, code);
                    return true;
                }
                LifecycleState::Starting => {
                    word.state = LifecycleState::StartingExitRequested;
                    word.exit_code = code;
                    drop(word);
                    trace_exit_request(from, LifecycleState::StartingExitRequested, code);
                    return true;
                }
                LifecycleState::StartingAsyncWait => word = wait(&self.resolved, word),
                _ => return false,
            }
        }
    }

    /// Requests a clean shutdown.
    pub fn request_shutdown(&self) -> bool {
        self.request_exit(ExitCode::OK)
    }

    /// Requests a full in-place reload.
    pub fn request_reload(&self) -> bool {
        self.request_exit(ExitCode::RELOAD_FULL)
    }

    /// Records that the pipeline is stopping with `code`.
    ///
    /// A cycle that is already stopping keeps the code recorded first.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::AsyncExit`] after an asynchronous exit.
    ///
    /// # Panics
    ///
    /// Panics with [`InconsistentState`] when no cycle is starting, running or
    /// stopping.
    pub fn stopping(&self, code: ExitCode) -> Result<(), ExecutionError> {
        let mut word = self.lock();
        let from = word.state;
        match from {
            LifecycleState::Stopping => Ok(()),
            LifecycleState::AsyncExit => Err(ExecutionError::async_exit()),
            LifecycleState::Starting | LifecycleState::StartingExitRequested => {
                word.timing.mark_stop();
                word.stop_with(code);
                self.up.notify_all();
                drop(word);
                trace_transition("stopping", from, LifecycleState::Stopping);
                Ok(())
            }
            LifecycleState::Running => {
                word.timing.mark_stop();
                word.stop_with(code);
                drop(word);
                trace_transition("stopping", from, LifecycleState::Stopping);
                Ok(())
            }
            _ => inconsistent("stopping", word),
        }
    }

    /// Records a failure escaping the pipeline and returns the error the
    /// caller should propagate.
    ///
    /// The recorded code becomes [`ExitCode::EXCEPTION`], or
    /// [`ExitCode::UNCLEAN_SHUTDOWN`] when the failure interrupted a clean
    /// stop. After an asynchronous exit the returned error is the
    /// asynchronous-exit signal, carrying `failure` as its cause unless it
    /// already was that signal.
    ///
    /// # Panics
    ///
    /// Panics with [`InconsistentState`] when no cycle is starting, running or
    /// stopping.
    #[must_use = "the returned error must be propagated"]
    pub fn stopping_exception(&self, failure: ExecutionError) -> ExecutionError {
        let mut word = self.lock();
        let from = word.state;
        match from {
            LifecycleState::Stopping => {
                match word.exit_code {
                    ExitCode::EXCEPTION | ExitCode::UNCLEAN_SHUTDOWN => {}
                    ExitCode::OK => word.exit_code = ExitCode::UNCLEAN_SHUTDOWN,
                    _ => word.exit_code = ExitCode::EXCEPTION,
                }
                failure
            }
            LifecycleState::AsyncExit => {
                if failure.is_async_exit() {
                    failure
                } else {
                    ExecutionError::async_exit_caused_by(failure)
                }
            }
            LifecycleState::Starting | LifecycleState::StartingExitRequested => {
                word.timing.mark_stop();
                word.stop_with(ExitCode::EXCEPTION);
                self.up.notify_all();
                drop(word);
                trace_transition("stopping_exception", from, LifecycleState::Stopping);
                failure
            }
            LifecycleState::Running => {
                word.timing.mark_stop();
                word.stop_with(ExitCode::EXCEPTION);
                drop(word);
                trace_transition("stopping_exception", from, LifecycleState::Stopping);
                failure
            }
            _ => inconsistent("stopping_exception", word),
        }
    }

    /// Completes the run cycle once the pipeline has fully unwound.
    ///
    /// A synchronous cycle returns to `Idle`; an asynchronous one parks in
    /// `StoppingAsyncWait` until the caller collects the outcome. After an
    /// asynchronous exit the machine becomes `Dead`.
    pub fn last_stop(&self) {
        self.finish(None);
    }

    /// As [`Lifecycle::last_stop`], parking `failure` for the asynchronous
    /// caller in the same critical section.
    pub fn last_stop_with_failure(&self, failure: ExecutionError) {
        self.finish(Some(failure));
    }

    fn finish(&self, failure: Option<ExecutionError>) {
        let mut word = self.lock();
        let from = word.state;
        let to = match from {
            LifecycleState::Stopping if word.is_async => {
                word.state = LifecycleState::StoppingAsyncWait;
                word.pending = failure;
                LifecycleState::StoppingAsyncWait
            }
            LifecycleState::Stopping => {
                word.reset_idle();
                LifecycleState::Idle
            }
            LifecycleState::AsyncExit => {
                word.enter(LifecycleState::Dead);
                LifecycleState::Dead
            }
            _ => return,
        };
        self.terminated.notify_all();
        drop(word);
        trace_transition("last_stop", from, to);
    }

    /// Blocks until an asynchronously started cycle has finished and returns
    /// its exit code.
    ///
    /// Returns [`ExitStatus::StillRunning`] when the application is running,
    /// which is what a caller observes right after a reload.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Failed`] carrying the failure of the cycle,
    /// [`ExecutionError::AsyncExit`] after an asynchronous exit, and
    /// [`ExecutionError::NotRunning`] when no cycle is active.
    pub fn await_exit(&self) -> Result<ExitStatus, ExecutionError> {
        let mut word = self.lock();
        loop {
            match word.state {
                LifecycleState::StoppingAsyncWait => {
                    let code = word.exit_code;
                    let pending = word.pending.take();
                    word.reset_idle();
                    self.resolved.notify_all();
                    return pending.map_or(Ok(ExitStatus::Exited(code)), |failure| {
                        Err(ExecutionError::failed(failure))
                    });
                }
                LifecycleState::Stopping
                | LifecycleState::Starting
                | LifecycleState::StartingExitRequested => {
                    word = wait(&self.terminated, word);
                }
                LifecycleState::Running => return Ok(ExitStatus::StillRunning),
                LifecycleState::StartingAsyncWait => {
                    word.state = LifecycleState::Running;
                    word.awaiting_up = false;
                    self.resolved.notify_all();
                    return Ok(ExitStatus::StillRunning);
                }
                LifecycleState::AsyncExit | LifecycleState::Dead => {
                    return Err(ExecutionError::async_exit());
                }
                LifecycleState::Idle => return Err(ExecutionError::NotRunning),
            }
        }
    }

    /// Blocks until a starting application is up, has failed, or has exited
    /// before ever running.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Failed`] when the cycle failed before coming
    /// up, [`ExecutionError::AsyncExit`] after an asynchronous exit, and
    /// [`ExecutionError::NotStarting`] when no cycle is active.
    pub fn await_server_up(&self) -> Result<(), ExecutionError> {
        let mut word = self.lock();
        loop {
            match word.state {
                LifecycleState::StartingAsyncWait => {
                    word.state = LifecycleState::Running;
                    word.awaiting_up = false;
                    self.resolved.notify_all();
                    return Ok(());
                }
                LifecycleState::Running => {
                    word.awaiting_up = false;
                    return Ok(());
                }
                LifecycleState::Starting | LifecycleState::StartingExitRequested => {
                    word = wait(&self.up, word);
                }
                LifecycleState::Stopping => word = wait(&self.terminated, word),
                LifecycleState::StoppingAsyncWait => {
                    if let Some(failure) = word.pending.take() {
                        word.reset_idle();
                        self.resolved.notify_all();
                        return Err(ExecutionError::failed(failure));
                    }
                    return Ok(());
                }
                LifecycleState::AsyncExit | LifecycleState::Dead => {
                    return Err(ExecutionError::async_exit());
                }
                LifecycleState::Idle => return Err(ExecutionError::NotStarting),
            }
        }
    }

    /// Forces the machine towards an asynchronous exit and blocks until the
    /// pipeline has unwound to `Dead`.
    pub fn signal_async_exit_and_await_term(&self) {
        let mut word = self.force_async_exit();
        while word.state == LifecycleState::AsyncExit {
            word = wait(&self.terminated, word);
        }
    }

    /// Forces the machine towards an asynchronous exit without waiting.
    ///
    /// A machine with no pipeline left to unwind becomes `Dead` at once.
    pub fn signal_async_exit(&self) {
        drop(self.force_async_exit());
    }

    fn force_async_exit(&self) -> MutexGuard<'_, Word> {
        let mut word = self.lock();
        let from = word.state;
        let to = match from {
            LifecycleState::AsyncExit | LifecycleState::Dead => return word,
            LifecycleState::Starting
            | LifecycleState::StartingExitRequested
            | LifecycleState::StartingAsyncWait
            | LifecycleState::Running => {
                word.timing.mark_stop();
                LifecycleState::AsyncExit
            }
            LifecycleState::Stopping => LifecycleState::AsyncExit,
            LifecycleState::StoppingAsyncWait | LifecycleState::Idle => LifecycleState::Dead,
        };
        word.enter(to);
        self.notify_everyone();
        drop(word);
        trace_transition("signal_async_exit", from, to);
        self.lock()
    }

    fn notify_everyone(&self) {
        self.stop_requested.notify_all();
        self.terminated.notify_all();
        self.up.notify_all();
        self.resolved.notify_all();
    }

    // The word is always consistent before any panic, so a poisoned lock is
    // still safe to use.
    fn lock(&self) -> MutexGuard<'_, Word> {
        self.word.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn wait<'a>(condition: &Condvar, guard: MutexGuard<'a, Word>) -> MutexGuard<'a, Word> {
    condition.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

fn inconsistent(operation: &'static str, word: MutexGuard<'_, Word>) -> ! {
    let violation = InconsistentState {
        operation,
        state: word.state,
    };
    drop(word);
    error!(
        target: LIFECYCLE_TARGET,
        operation,
        state = %violation.state,
        "lifecycle protocol violated"
    );
    panic::panic_any(violation)
}

fn trace_transition(operation: &'static str, from: LifecycleState, to: LifecycleState) {
    debug!(
        target: LIFECYCLE_TARGET,
        operation,
        from = %from,
        to = %to,
        "lifecycle transition"
    );
}

fn trace_exit_request(from: LifecycleState, to: LifecycleState, code: ExitCode) {
    debug!(
        target: LIFECYCLE_TARGET,
        operation = "request_exit",
        from = %from,
        to = %to,
        exit_code = code.get(),
        "exit requested"
    );
}
