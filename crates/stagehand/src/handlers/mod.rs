//! Stock pipeline stages.

mod config;
mod restart;
mod signals;

pub use config::{ConfigHandler, ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use restart::RestartHandler;
pub use signals::{SignalHandler, SignalInstallError};
