//! Defines the error surface shared by the state machine and the chain.
//!
//! Sources are held in `Arc` so the error stays `Clone + Send + Sync` and can
//! be parked in the pending-failure slot and handed to another thread.

use std::any::Any;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Shared, type-erased failure raised by a pipeline stage.
pub type StageFailure = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by lifecycle transitions and pipeline stages.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Something outside the normal stop path force-stopped the application.
    ///
    /// This is a control-flow signal rather than an application failure;
    /// callers use [`ExecutionError::is_async_exit`] to tell the two apart.
    #[error("application was asynchronously exited")]
    AsyncExit {
        /// Failure that was in flight when the exit was observed.
        #[source]
        cause: Option<Arc<ExecutionError>>,
    },
    /// An application instance is already starting or running.
    #[error("an application instance is already running")]
    AlreadyRunning,
    /// `await_exit` was called while no run cycle was active.
    #[error("application is not running")]
    NotRunning,
    /// `await_server_up` was called while no run cycle was starting.
    #[error("application is not starting")]
    NotStarting,
    /// A pipeline stage reported a failure.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// Underlying failure.
        #[source]
        source: StageFailure,
    },
    /// A pipeline stage panicked.
    #[error("stage '{stage}' panicked: {message}")]
    Panicked {
        /// Name of the panicking stage.
        stage: String,
        /// Panic message, when the payload carried one.
        message: String,
    },
    /// A stage required a context facet that no earlier stage provided.
    #[error("execution context has no value of type {facet}")]
    MissingContext {
        /// Type name of the missing facet.
        facet: &'static str,
    },
    /// An asynchronously started run failed; delivered to the waiting caller.
    #[error("asynchronous run failed: {source}")]
    Failed {
        /// Failure captured by the worker.
        #[source]
        source: Arc<ExecutionError>,
    },
    /// The worker thread for an asynchronous run could not be spawned.
    #[error("failed to spawn lifecycle worker: {source}")]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl ExecutionError {
    /// Builds a [`ExecutionError::Stage`] from any error type.
    pub fn stage<E>(stage: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Stage {
            stage: stage.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` when this is the asynchronous-exit signal.
    #[must_use]
    pub const fn is_async_exit(&self) -> bool {
        matches!(self, Self::AsyncExit { .. })
    }

    pub(crate) const fn async_exit() -> Self {
        Self::AsyncExit { cause: None }
    }

    pub(crate) fn async_exit_caused_by(cause: Self) -> Self {
        Self::AsyncExit {
            cause: Some(Arc::new(cause)),
        }
    }

    pub(crate) fn failed(source: Self) -> Self {
        Self::Failed {
            source: Arc::new(source),
        }
    }

    pub(crate) fn from_panic(stage: &str, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("non-string panic payload"));
        Self::Panicked {
            stage: stage.to_owned(),
            message,
        }
    }
}
