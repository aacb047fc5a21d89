//! Signal listener stage.
//!
//! SIGHUP requests an in-place reload; SIGTERM, SIGINT and SIGQUIT request an
//! exit with `128 + signal`. A terminating signal that repeats one the
//! listener already turned into an exit request forces an asynchronous exit.

use std::io;
use std::sync::Arc;
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use crate::SIGNALS_TARGET;
use crate::chain::{Chain, Handler};
use crate::context::Context;
use crate::errors::ExecutionError;
use crate::lifecycle::{ExitCode, Lifecycle, LifecycleState};

const LISTENER_THREAD_NAME: &str = "stagehand-signals";
const DEFAULT_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors raised while installing the signal listener.
#[derive(Debug, Error)]
pub enum SignalInstallError {
    /// Registering the signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The listener thread could not be spawned.
    #[error("failed to spawn signal listener: {source}")]
    Listener {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// What a received signal did to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// An exit or reload was requested.
    Requested,
    /// A terminating signal repeated while its exit was under way; the run
    /// was forced out.
    Forced,
    /// The machine was in no state to act on the signal.
    Ignored,
}

impl Delivery {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Forced => "forced",
            Self::Ignored => "ignored",
        }
    }
}

/// Stage that turns process signals into lifecycle transitions for the
/// duration of the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    signals: Vec<i32>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self {
            signals: DEFAULT_SIGNALS.to_vec(),
        }
    }
}

impl SignalHandler {
    /// Listens for SIGTERM, SIGINT, SIGQUIT and SIGHUP.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Listens for `signals` only.
    #[must_use]
    pub fn with_signals(signals: impl IntoIterator<Item = i32>) -> Self {
        Self {
            signals: signals.into_iter().collect(),
        }
    }

    fn install(&self, lifecycle: Arc<Lifecycle>) -> Result<Listener, SignalInstallError> {
        let mut signals =
            Signals::new(&self.signals).map_err(|source| SignalInstallError::Install { source })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name(LISTENER_THREAD_NAME.to_owned())
            .spawn(move || {
                let mut relay = SignalRelay::new(lifecycle);
                for signal in signals.forever() {
                    let delivery = relay.deliver(signal);
                    info!(
                        target: SIGNALS_TARGET,
                        signal,
                        delivery = delivery.as_str(),
                        "signal received"
                    );
                }
            })
            .map_err(|source| SignalInstallError::Listener { source })?;
        Ok(Listener { handle, thread })
    }
}

impl Handler for SignalHandler {
    fn name(&self) -> &str {
        "signals"
    }

    fn handle(&self, chain: &Chain, context: &Context) -> Result<ExitCode, ExecutionError> {
        let listener = self
            .install(Arc::clone(chain.lifecycle()))
            .map_err(|error| ExecutionError::stage(self.name(), error))?;
        let outcome = chain.proceed(context);
        listener.shutdown();
        outcome
    }
}

struct Listener {
    handle: signal_hook::iterator::Handle,
    thread: thread::JoinHandle<()>,
}

impl Listener {
    fn shutdown(self) {
        self.handle.close();
        if self.thread.join().is_err() {
            warn!(target: SIGNALS_TARGET, "signal listener panicked");
        }
    }
}

/// Applies received signals to the state machine, remembering whether a
/// terminating signal has already been turned into an exit request.
pub(crate) struct SignalRelay {
    lifecycle: Arc<Lifecycle>,
    exit_requested: bool,
}

impl SignalRelay {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            lifecycle,
            exit_requested: false,
        }
    }

    /// Applies one received signal.
    ///
    /// A terminating signal that finds another exit (a reload teardown, say)
    /// already under way is ignored; only a repeat of one this relay
    /// requested forces the run out.
    pub(crate) fn deliver(&mut self, signal: i32) -> Delivery {
        if signal == SIGHUP {
            return if self.lifecycle.request_reload() {
                Delivery::Requested
            } else {
                Delivery::Ignored
            };
        }
        let Some(code) = ExitCode::from_signal(signal) else {
            return Delivery::Ignored;
        };
        if self.lifecycle.request_exit(code) {
            self.exit_requested = true;
            return Delivery::Requested;
        }
        match self.lifecycle.state() {
            LifecycleState::Stopping | LifecycleState::StartingExitRequested
                if self.exit_requested =>
            {
                self.lifecycle.signal_async_exit();
                Delivery::Forced
            }
            _ => Delivery::Ignored,
        }
    }
}
