//! Configuration loading stage.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use tracing::{error, info};

use stagehand_config::Config;

use crate::CHAIN_TARGET;
use crate::chain::{Chain, Handler};
use crate::context::Context;
use crate::errors::ExecutionError;
use crate::lifecycle::ExitCode;

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the coordinator configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader error when no layer yields a valid configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved ahead of time.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already-resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Stage that loads and validates [`Config`] and exposes it to later stages
/// through the context.
///
/// A configuration that fails to load or validate ends the run with
/// [`ExitCode::CONFIG_ERROR`] before any later stage is invoked.
#[derive(Debug, Default)]
pub struct ConfigHandler<L> {
    loader: L,
}

impl<L> ConfigHandler<L>
where
    L: ConfigLoader,
{
    /// Builds the stage around `loader`.
    #[must_use]
    pub const fn new(loader: L) -> Self {
        Self { loader }
    }
}

impl<L> Handler for ConfigHandler<L>
where
    L: ConfigLoader,
{
    fn name(&self) -> &str {
        "config"
    }

    fn handle(&self, chain: &Chain, context: &Context) -> Result<ExitCode, ExecutionError> {
        let config = match self.loader.load() {
            Ok(config) => config,
            Err(source) => {
                error!(
                    target: CHAIN_TARGET,
                    stage = self.name(),
                    error = %source,
                    "failed to load configuration"
                );
                return Ok(ExitCode::CONFIG_ERROR);
            }
        };
        if let Err(source) = config.validate() {
            error!(
                target: CHAIN_TARGET,
                stage = self.name(),
                error = %source,
                "configuration rejected"
            );
            return Ok(ExitCode::CONFIG_ERROR);
        }
        info!(
            target: CHAIN_TARGET,
            stage = self.name(),
            log_filter = config.log_filter(),
            log_format = ?config.log_format(),
            restart_exit_code = config.restart_exit_code(),
            "configuration loaded"
        );
        chain.proceed(&context.with(config))
    }
}
