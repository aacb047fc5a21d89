//! Application lifecycle coordination.
//!
//! Stagehand decides, under concurrent access, whether an application
//! instance may start, is running, is stopping, has restarted in place, or has
//! been torn down by an out-of-band exit, and hands the final outcome back to
//! whichever caller is waiting for it.
//!
//! The crate is built from three pieces:
//!
//! - [`Lifecycle`], the state machine. One instance is created at process
//!   entry and shared through an [`Arc`](std::sync::Arc); every transition is
//!   serialised under a single lock.
//! - [`Chain`], an ordered pipeline of [`Handler`] stages that drives the
//!   state machine through start, run and stop. The terminal node blocks
//!   until a stop is requested.
//! - [`Context`], a persistent parent-linked value carrier that stages use to
//!   pass typed facets further down the pipeline.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stagehand::{ChainBuilder, Context, Lifecycle, RestartHandler, SignalHandler, handler_fn};
//!
//! let lifecycle = Arc::new(Lifecycle::new());
//! let chain = ChainBuilder::new()
//!     .stage(SignalHandler::new())
//!     .stage(RestartHandler::new())
//!     .stage(handler_fn("application", |chain, context| chain.proceed(context)))
//!     .build(lifecycle);
//! chain.start_and_exit(Context::new());
//! ```

mod chain;
mod context;
mod errors;
pub mod handlers;
mod lifecycle;
mod reporter;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use chain::{
    AsyncRun, Chain, ChainBuilder, FnHandler, Handler, ProcessTerminator, Terminator, handler_fn,
};
pub use context::Context;
pub use errors::{ExecutionError, StageFailure};
pub use handlers::{
    ConfigHandler, ConfigLoader, RestartHandler, SignalHandler, StaticConfigLoader,
    SystemConfigLoader,
};
pub use lifecycle::{
    ExitCode, ExitStatus, InconsistentState, Lifecycle, LifecycleState, StartOutcome, Timing,
};
pub use reporter::{LifecycleReporter, StructuredLifecycleReporter};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
pub(crate) const CHAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::chain");
pub(crate) const SIGNALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");
