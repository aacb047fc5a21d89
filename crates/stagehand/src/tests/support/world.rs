//! Scenario world shared across lifecycle BDD steps.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{
    AsyncRun, Chain, ChainBuilder, Context, ExecutionError, ExitCode, Handler, Lifecycle,
    LifecycleState, RestartHandler, handler_fn,
};

use super::{RecordingLifecycleReporter, RecordingTerminator};

/// How the application stage behaves each time it is invoked.
#[derive(Debug, Clone, Default)]
enum Application {
    /// Runs until something requests a stop.
    #[default]
    Serve,
    /// Returns the next scripted code without coming up.
    Scripted(Vec<ExitCode>),
    /// Fails before coming up.
    FailStartup,
}

#[derive(Debug)]
struct StartupRejected;

impl fmt::Display for StartupRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("deployment rejected")
    }
}

impl std::error::Error for StartupRejected {}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub lifecycle: Arc<Lifecycle>,
    pub reporter: Arc<RecordingLifecycleReporter>,
    pub terminator: RecordingTerminator,
    application: Application,
    startup_exit: Option<ExitCode>,
    exit_once_running: Option<ExitCode>,
    invocations: Arc<AtomicUsize>,
    requester: Option<JoinHandle<bool>>,
    pub exit_code: Option<ExitCode>,
    pub async_run: Option<AsyncRun>,
    pub async_error: Option<ExecutionError>,
}

impl TestWorld {
    /// Builds a world around a fresh state machine.
    pub fn new() -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        Self {
            terminator: RecordingTerminator::new(Arc::clone(&lifecycle)),
            lifecycle,
            reporter: Arc::new(RecordingLifecycleReporter::default()),
            application: Application::default(),
            startup_exit: None,
            exit_once_running: None,
            invocations: Arc::new(AtomicUsize::new(0)),
            requester: None,
            exit_code: None,
            async_run: None,
            async_error: None,
        }
    }

    /// Makes the application run until something requests a stop.
    pub fn serve_until_stopped(&mut self) {
        self.application = Application::Serve;
    }

    /// Makes the application return `codes` on successive runs.
    pub fn script_exit_codes(&mut self, codes: Vec<ExitCode>) {
        self.application = Application::Scripted(codes);
    }

    /// Makes the application fail before it comes up.
    pub fn fail_startup(&mut self) {
        self.application = Application::FailStartup;
    }

    /// Requests an exit from a stage that runs before the application.
    pub fn request_exit_during_startup(&mut self, code: ExitCode) {
        self.startup_exit = Some(code);
    }

    /// Requests an exit from another thread once the application is running.
    pub fn request_exit_once_running(&mut self, code: ExitCode) {
        self.exit_once_running = Some(code);
    }

    /// Number of times the application stage was invoked.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Runs the pipeline through the synchronous entry point.
    pub fn run_synchronously(&mut self) {
        let chain = self.build_chain();
        self.spawn_requester();
        let code = chain.start_and_exit_with(Context::new(), &self.terminator);
        self.exit_code = Some(code);
        self.join_requester();
    }

    /// Runs the pipeline on a worker thread.
    pub fn start_asynchronously(&mut self) {
        let chain = self.build_chain();
        match chain.start_asynchronously(Context::new()) {
            Ok(run) => self.async_run = Some(run),
            Err(error) => self.async_error = Some(error),
        }
    }

    /// Forces an asynchronous exit and waits for the worker to finish.
    pub fn force_exit(&mut self) {
        self.lifecycle.signal_async_exit_and_await_term();
        if let Some(run) = self.async_run.take() {
            run.join().expect("worker should not panic");
        }
    }

    fn build_chain(&self) -> Chain {
        let mut builder = ChainBuilder::new()
            .reporter(self.reporter.clone())
            .stage(RestartHandler::new());
        if let Some(code) = self.startup_exit {
            builder = builder.stage(handler_fn("startup-exit", move |chain, context| {
                chain.lifecycle().request_exit(code);
                chain.proceed(context)
            }));
        }
        builder
            .shared_stage(self.application_stage())
            .build(Arc::clone(&self.lifecycle))
    }

    fn application_stage(&self) -> Arc<dyn Handler> {
        let invocations = Arc::clone(&self.invocations);
        let application = self.application.clone();
        Arc::new(handler_fn("application", move |chain, context| {
            let run = invocations.fetch_add(1, Ordering::SeqCst);
            match &application {
                Application::Serve => chain.proceed(context),
                Application::Scripted(codes) => {
                    Ok(codes.get(run).copied().unwrap_or(ExitCode::OK))
                }
                Application::FailStartup => {
                    Err(ExecutionError::stage("application", StartupRejected))
                }
            }
        }))
    }

    fn spawn_requester(&mut self) {
        let Some(code) = self.exit_once_running else {
            return;
        };
        let lifecycle = Arc::clone(&self.lifecycle);
        self.requester = Some(thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while lifecycle.state() != LifecycleState::Running {
                if Instant::now() > deadline {
                    return false;
                }
                thread::sleep(Duration::from_millis(2));
            }
            lifecycle.request_exit(code)
        }));
    }

    fn join_requester(&mut self) {
        if let Some(requester) = self.requester.take() {
            let delivered = requester.join().expect("requester should not panic");
            assert!(delivered, "exit request was not delivered");
        }
    }
}

/// Fixture constructor shared by the scenario bindings.
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
