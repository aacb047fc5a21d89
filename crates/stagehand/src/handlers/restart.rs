//! In-place restart stage.

use tracing::debug;

use stagehand_config::Config;

use crate::CHAIN_TARGET;
use crate::chain::{Chain, Handler};
use crate::context::Context;
use crate::errors::ExecutionError;
use crate::lifecycle::ExitCode;

/// Stage that re-runs the rest of the pipeline while it stops with the
/// restart exit code.
///
/// The code is taken from, in order: the value given to
/// [`RestartHandler::with_code`], the [`Config`] in the context, and
/// [`ExitCode::RELOAD_FULL`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RestartHandler {
    restart_code: Option<ExitCode>,
}

impl RestartHandler {
    /// Restarts on the configured code.
    #[must_use]
    pub const fn new() -> Self {
        Self { restart_code: None }
    }

    /// Restarts on `code` regardless of configuration.
    #[must_use]
    pub const fn with_code(code: ExitCode) -> Self {
        Self {
            restart_code: Some(code),
        }
    }

    fn restart_code(&self, context: &Context) -> ExitCode {
        self.restart_code
            .or_else(|| {
                context
                    .get::<Config>()
                    .map(|config| ExitCode::new(config.restart_exit_code()))
            })
            .unwrap_or(ExitCode::RELOAD_FULL)
    }
}

impl Handler for RestartHandler {
    fn name(&self) -> &str {
        "restart"
    }

    fn handle(&self, chain: &Chain, context: &Context) -> Result<ExitCode, ExecutionError> {
        let restart_code = self.restart_code(context);
        let mut attempt: u32 = 0;
        loop {
            let code = chain.proceed(context)?;
            if code != restart_code {
                debug!(
                    target: CHAIN_TARGET,
                    stage = self.name(),
                    restarts = attempt,
                    exit_code = code.get(),
                    "pipeline finished"
                );
                return Ok(code);
            }
            attempt = attempt.saturating_add(1);
            chain.reporter().restarting(attempt, code);
        }
    }
}
