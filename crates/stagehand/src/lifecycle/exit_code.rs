//! Exit-code convention shared with the OS process status and embedders.

use std::fmt;

/// Integer in `0..=255` summarising why and how an application stopped.
///
/// Code `10` is reserved and deliberately has no constant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExitCode(u8);

impl ExitCode {
    /// Clean shutdown.
    pub const OK: Self = Self(0);
    /// Configuration or usage problem.
    pub const CONFIG_ERROR: Self = Self(1);
    /// Uncaught failure.
    pub const EXCEPTION: Self = Self(2);
    /// Shutdown did not proceed cleanly.
    pub const UNCLEAN_SHUTDOWN: Self = Self(3);
    /// Restart the application in place without exiting the process.
    pub const RELOAD_FULL: Self = Self(11);
    /// Restart the application but keep listeners and thread pools.
    pub const RELOAD_PARTIAL: Self = Self(12);
    /// Added to a signal number to report termination by that signal.
    pub const SIGNAL_BASE: u8 = 128;

    /// Wraps a raw exit code.
    #[must_use]
    pub const fn new(code: u8) -> Self {
        Self(code)
    }

    /// Exit code reporting termination by `signal`.
    ///
    /// Returns `None` when the signal number does not fit in the
    /// `128 + n` range.
    #[must_use]
    pub fn from_signal(signal: i32) -> Option<Self> {
        u8::try_from(signal)
            .ok()
            .filter(|number| *number < Self::SIGNAL_BASE)
            .map(|number| Self(Self::SIGNAL_BASE + number))
    }

    /// Raw exit code.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Signal number encoded in this code, if it reports one.
    #[must_use]
    pub const fn signal(self) -> Option<u8> {
        if self.0 >= Self::SIGNAL_BASE {
            Some(self.0 - Self::SIGNAL_BASE)
        } else {
            None
        }
    }

    /// Returns `true` for the in-place restart codes.
    #[must_use]
    pub const fn is_reload(self) -> bool {
        self.0 == Self::RELOAD_FULL.0 || self.0 == Self::RELOAD_PARTIAL.0
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ExitCode {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        Self::from(code.0)
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.0)
    }
}

/// Outcome of [`Lifecycle::starting`](super::Lifecycle::starting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Keep starting; invoke the next stage.
    Continue,
    /// An exit was requested before the application came up.
    Exit(ExitCode),
}

/// Outcome of [`Lifecycle::await_exit`](super::Lifecycle::await_exit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The run cycle finished with this code.
    Exited(ExitCode),
    /// The application is running again after an in-place reload.
    StillRunning,
}

impl ExitStatus {
    /// Exit code, if the run cycle finished.
    #[must_use]
    pub const fn code(self) -> Option<ExitCode> {
        match self {
            Self::Exited(code) => Some(code),
            Self::StillRunning => None,
        }
    }
}
