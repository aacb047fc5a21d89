//! Demo daemon for the lifecycle coordinator.
//!
//! Runs an idle application behind the stock configuration, signal and
//! restart stages. SIGHUP restarts the application in place; SIGTERM, SIGINT
//! and SIGQUIT stop it with `128 + signal`.

use std::fmt;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use stagehand::telemetry;
use stagehand::{
    ChainBuilder, ConfigHandler, ConfigLoader, Context, ExitCode, Lifecycle, RestartHandler,
    SignalHandler, StaticConfigLoader, SystemConfigLoader, handler_fn,
};

const APPLICATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::application");

fn main() {
    let config = match SystemConfigLoader.load() {
        Ok(config) => config,
        Err(error) => fail(format_args!("failed to load configuration: {error}")),
    };
    if let Err(error) = telemetry::initialise(&config) {
        fail(format_args!("failed to initialise telemetry: {error}"));
    }

    ChainBuilder::new()
        .stage(ConfigHandler::new(StaticConfigLoader::new(config)))
        .stage(SignalHandler::new())
        .stage(RestartHandler::new())
        .stage(handler_fn("idle-application", |chain, context| {
            tracing::info!(
                target: APPLICATION_TARGET,
                pid = process::id(),
                "application deployed; waiting for a stop request"
            );
            let code = chain.proceed(context)?;
            tracing::info!(
                target: APPLICATION_TARGET,
                exit_code = code.get(),
                "application undeployed"
            );
            Ok(code)
        }))
        .build(Arc::new(Lifecycle::new()))
        .start_and_exit(Context::new())
}

fn fail(message: fmt::Arguments<'_>) -> ! {
    drop(writeln!(io::stderr().lock(), "stagehand: {message}"));
    process::exit(i32::from(ExitCode::CONFIG_ERROR))
}
