use crate::logging::LogFormat;

/// Default log filter expression used by the coordinator and its binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Exit code that asks the restart stage to run the pipeline again.
///
/// Matches the full-reload code reserved by the lifecycle coordinator.
pub const DEFAULT_RESTART_EXIT_CODE: u8 = 11;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default restart exit code.
#[must_use]
pub const fn default_restart_exit_code() -> u8 {
    DEFAULT_RESTART_EXIT_CODE
}
