//! Ordered handler pipeline driving the lifecycle state machine.
//!
//! Every [`Chain::proceed`] call moves the machine towards running before it
//! invokes a stage and records the stop after the stage returns. The terminal
//! node announces that the application is up and blocks until a stop is
//! requested.

mod handler;
mod run;
mod terminator;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::CHAIN_TARGET;
use crate::context::Context;
use crate::errors::ExecutionError;
use crate::lifecycle::{ExitCode, InconsistentState, Lifecycle, StartOutcome};
use crate::reporter::{LifecycleReporter, StructuredLifecycleReporter};

pub use handler::{FnHandler, Handler, handler_fn};
pub use run::AsyncRun;
pub use terminator::{ProcessTerminator, Terminator};

enum Node {
    Stage {
        handler: Arc<dyn Handler>,
        next: Arc<Node>,
    },
    Terminal,
}

struct Shared {
    lifecycle: Arc<Lifecycle>,
    reporter: Arc<dyn LifecycleReporter>,
}

/// Immutable pipeline of handlers, positioned at one stage.
///
/// Cloning is cheap; clones share the stages, the state machine and the
/// reporter.
#[derive(Clone)]
pub struct Chain {
    node: Arc<Node>,
    shared: Arc<Shared>,
}

impl Chain {
    /// State machine this pipeline drives.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.shared.lifecycle
    }

    /// Reporter receiving run-cycle events.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn LifecycleReporter> {
        &self.shared.reporter
    }

    /// Names of the stages from this position to the end of the pipeline.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut node = &*self.node;
        while let Node::Stage { handler, next } = node {
            names.push(handler.name());
            node = next;
        }
        names
    }

    /// Runs the stage at this position and, through it, the rest of the
    /// pipeline.
    ///
    /// An exit requested before the application came up is returned without
    /// invoking the stage. Failures and panics escaping the stage are
    /// recorded by the state machine before they are returned.
    ///
    /// # Errors
    ///
    /// Returns the failure raised by this or any later stage, or the
    /// asynchronous-exit signal.
    ///
    /// # Panics
    ///
    /// Resumes any [`InconsistentState`] panic raised beneath it.
    pub fn proceed(&self, context: &Context) -> Result<ExitCode, ExecutionError> {
        let lifecycle = self.lifecycle();
        if let StartOutcome::Exit(code) = lifecycle.starting()? {
            debug!(
                target: CHAIN_TARGET,
                exit_code = code.get(),
                "exit requested before startup completed"
            );
            return Ok(code);
        }
        let Node::Stage { handler, next } = &*self.node else {
            return lifecycle
                .signal_up_and_await_stop()
                .map_err(|failure| lifecycle.stopping_exception(failure));
        };
        match self.invoke(handler.as_ref(), next, context) {
            Ok(code) => {
                lifecycle.stopping(code)?;
                Ok(code)
            }
            Err(failure) => {
                debug!(
                    target: CHAIN_TARGET,
                    stage = handler.name(),
                    error = %failure,
                    "stage returned an error"
                );
                Err(lifecycle.stopping_exception(failure))
            }
        }
    }

    fn invoke(
        &self,
        handler: &dyn Handler,
        next: &Arc<Node>,
        context: &Context,
    ) -> Result<ExitCode, ExecutionError> {
        let next = Self {
            node: Arc::clone(next),
            shared: Arc::clone(&self.shared),
        };
        debug!(target: CHAIN_TARGET, stage = handler.name(), "entering stage");
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&next, context))) {
            Ok(outcome) => outcome,
            Err(payload) if payload.is::<InconsistentState>() => panic::resume_unwind(payload),
            Err(payload) => {
                let failure = ExecutionError::from_panic(handler.name(), payload.as_ref());
                error!(
                    target: CHAIN_TARGET,
                    stage = handler.name(),
                    error = %failure,
                    "stage panicked"
                );
                Err(failure)
            }
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .field("state", &self.lifecycle().state())
            .finish_non_exhaustive()
    }
}

/// Builds a [`Chain`] from an ordered list of stages.
#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<Arc<dyn Handler>>,
    reporter: Option<Arc<dyn LifecycleReporter>>,
}

impl ChainBuilder {
    /// Starts an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage<H>(self, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.shared_stage(Arc::new(handler))
    }

    /// Appends a stage that is also held elsewhere.
    #[must_use]
    pub fn shared_stage(mut self, handler: Arc<dyn Handler>) -> Self {
        self.stages.push(handler);
        self
    }

    /// Replaces the default [`StructuredLifecycleReporter`].
    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn LifecycleReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Links the stages in order, ending with the terminal node.
    #[must_use]
    pub fn build(self, lifecycle: Arc<Lifecycle>) -> Chain {
        let node = self
            .stages
            .into_iter()
            .rev()
            .fold(Arc::new(Node::Terminal), |next, handler| {
                Arc::new(Node::Stage { handler, next })
            });
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(StructuredLifecycleReporter::new()));
        Chain {
            node,
            shared: Arc::new(Shared {
                lifecycle,
                reporter,
            }),
        }
    }
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|stage| stage.name()).collect();
        f.debug_struct("ChainBuilder")
            .field("stages", &names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
