//! Process termination seam for the synchronous entry point.

use std::process;

use crate::lifecycle::ExitCode;

/// Ends the process once the synchronous pipeline has fully unwound.
pub trait Terminator {
    /// Terminates with `code`. Production implementations do not return.
    fn terminate(&self, code: ExitCode);
}

/// Terminator that calls [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: ExitCode) {
        process::exit(i32::from(code));
    }
}
