//! Shared configuration for the stagehand lifecycle coordinator.
//!
//! Values are layered by [`ortho_config`]: built-in defaults first, then
//! configuration files, `STAGEHAND_*` environment variables and finally
//! command-line flags. The loaded [`Config`] is immutable; pipeline stages
//! receive it through the execution context rather than re-reading it.

mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_RESTART_EXIT_CODE, default_log_filter,
    default_log_filter_string, default_log_format, default_restart_exit_code,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Exit codes below this value carry a fixed meaning and cannot trigger a
/// restart.
const FIRST_FREE_EXIT_CODE: u8 = 4;

/// Configuration consumed by the coordinator binaries and stock stages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "STAGEHAND")]
pub struct Config {
    /// Log filter expression in `tracing_subscriber::EnvFilter` syntax.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format used by the telemetry subscriber.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Exit code that makes the restart stage run the pipeline again.
    #[ortho_config(default = DEFAULT_RESTART_EXIT_CODE)]
    pub restart_exit_code: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            restart_exit_code: DEFAULT_RESTART_EXIT_CODE,
        }
    }
}

impl Config {
    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Exit code that triggers an in-process restart.
    #[must_use]
    pub const fn restart_exit_code(&self) -> u8 {
        self.restart_exit_code
    }

    /// Checks semantic constraints that the layered loader cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigValidationError::ReservedRestartCode`] when the restart
    /// code collides with one of the fixed outcome codes (clean exit,
    /// configuration error, failure, unclean shutdown).
    pub const fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.restart_exit_code < FIRST_FREE_EXIT_CODE {
            return Err(ConfigValidationError::ReservedRestartCode {
                code: self.restart_exit_code,
            });
        }
        Ok(())
    }
}

/// Semantic configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    /// The restart code is one of the reserved outcome codes.
    #[error("restart exit code {code} is reserved; use a value of 4 or above")]
    ReservedRestartCode {
        /// Rejected exit code.
        code: u8,
    },
}
