//! Pluggable pipeline stages.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::ExecutionError;
use crate::lifecycle::ExitCode;

use super::Chain;

/// One stage of the startup/shutdown pipeline.
///
/// A handler either short-circuits by returning without calling
/// [`Chain::proceed`], or calls it exactly once, wrapping the rest of the
/// pipeline with its own setup and teardown.
pub trait Handler: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Runs this stage. `chain` is positioned at the next stage.
    ///
    /// # Errors
    ///
    /// Any error is recorded by the state machine as a failed stop.
    fn handle(&self, chain: &Chain, context: &Context) -> Result<ExitCode, ExecutionError>;
}

impl<T> Handler for Arc<T>
where
    T: Handler + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn handle(&self, chain: &Chain, context: &Context) -> Result<ExitCode, ExecutionError> {
        (**self).handle(chain, context)
    }
}

/// Handler backed by a closure; see [`handler_fn`].
pub struct FnHandler<F> {
    name: String,
    body: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Chain, &Context) -> Result<ExitCode, ExecutionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, chain: &Chain, context: &Context) -> Result<ExitCode, ExecutionError> {
        (self.body)(chain, context)
    }
}

/// Adapts a closure into a named [`Handler`].
///
/// ```rust
/// use stagehand::{Handler, handler_fn};
///
/// let deploy = handler_fn("deploy", |chain, context| chain.proceed(context));
/// assert_eq!(deploy.name(), "deploy");
/// ```
pub fn handler_fn<F>(name: impl Into<String>, body: F) -> FnHandler<F>
where
    F: Fn(&Chain, &Context) -> Result<ExitCode, ExecutionError> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        body,
    }
}
