//! Unit tests for the handler chain and its entry points.

use std::fmt;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mockall::mock;
use mockall::predicate::eq;
use rstest::{fixture, rstest};

use crate::lifecycle::{ExitStatus, LifecycleState};

use super::*;

mock! {
    Exit {}
    impl Terminator for Exit {
        fn terminate(&self, code: ExitCode);
    }
}

mock! {
    Reporter {}
    impl LifecycleReporter for Reporter {
        fn run_starting(&self, asynchronous: bool);
        fn run_stopped(&self, code: ExitCode, uptime: Option<Duration>);
        fn run_failed(&self, error: &ExecutionError);
        fn restarting(&self, attempt: u32, code: ExitCode);
        fn async_exit(&self);
    }
}

#[derive(Debug)]
struct DeployFailed;

impl fmt::Display for DeployFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("deploy failed")
    }
}

impl std::error::Error for DeployFailed {}

#[fixture]
fn lifecycle() -> Arc<Lifecycle> {
    Arc::new(Lifecycle::new())
}

fn pass_through(name: &str) -> Arc<dyn Handler> {
    Arc::new(handler_fn(name, |chain, context| chain.proceed(context)))
}

fn exit_with(code: ExitCode) -> Arc<dyn Handler> {
    Arc::new(handler_fn("short-circuit", move |_, _| Ok(code)))
}

fn build(lifecycle: &Arc<Lifecycle>, stages: Vec<Arc<dyn Handler>>) -> Chain {
    stages
        .into_iter()
        .fold(ChainBuilder::new(), ChainBuilder::shared_stage)
        .build(Arc::clone(lifecycle))
}

fn request_exit_once_running(lifecycle: &Arc<Lifecycle>, code: ExitCode) -> JoinHandle<bool> {
    let lifecycle = Arc::clone(lifecycle);
    thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lifecycle.state() != LifecycleState::Running {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        lifecycle.request_exit(code)
    })
}

fn expect_termination(lifecycle: &Arc<Lifecycle>, code: ExitCode) -> MockExit {
    let observed = Arc::clone(lifecycle);
    let mut terminator = MockExit::new();
    terminator
        .expect_terminate()
        .withf(move |actual| *actual == code && observed.state() == LifecycleState::Idle)
        .times(1)
        .return_const(());
    terminator
}

#[rstest]
fn machine_is_idle_when_the_process_terminates(lifecycle: Arc<Lifecycle>) {
    let chain = build(&lifecycle, vec![pass_through("deploy"), pass_through("serve")]);
    let requester = request_exit_once_running(&lifecycle, ExitCode::new(143));
    let terminator = expect_termination(&lifecycle, ExitCode::new(143));

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::new(143));
    assert!(requester.join().expect("requester should not panic"));
    assert_eq!(lifecycle.state(), LifecycleState::Idle);
}

#[rstest]
fn exit_requested_during_startup_skips_later_stages(lifecycle: Arc<Lifecycle>) {
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reached);
    let requester: Arc<dyn Handler> = Arc::new(handler_fn("requester", |chain, context| {
        assert!(chain.lifecycle().request_exit(ExitCode::new(7)));
        chain.proceed(context)
    }));
    let later: Arc<dyn Handler> = Arc::new(handler_fn("later", move |chain, context| {
        counter.fetch_add(1, Ordering::SeqCst);
        chain.proceed(context)
    }));
    let chain = build(&lifecycle, vec![requester, later]);
    let terminator = expect_termination(&lifecycle, ExitCode::new(7));

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::new(7));
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[rstest]
fn short_circuiting_stage_sets_the_exit_code(lifecycle: Arc<Lifecycle>) {
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reached);
    let later: Arc<dyn Handler> = Arc::new(handler_fn("later", move |chain, context| {
        counter.fetch_add(1, Ordering::SeqCst);
        chain.proceed(context)
    }));
    let chain = build(&lifecycle, vec![exit_with(ExitCode::CONFIG_ERROR), later]);
    let terminator = expect_termination(&lifecycle, ExitCode::CONFIG_ERROR);

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::CONFIG_ERROR);
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[rstest]
fn startup_failure_exits_with_exception_and_is_reported(lifecycle: Arc<Lifecycle>) {
    let failing: Arc<dyn Handler> = Arc::new(handler_fn("deploy", |_, _| {
        Err(ExecutionError::stage("deploy", DeployFailed))
    }));
    let mut reporter = MockReporter::new();
    reporter
        .expect_run_starting()
        .with(eq(false))
        .times(1)
        .return_const(());
    reporter
        .expect_run_failed()
        .withf(|error| matches!(error, ExecutionError::Stage { stage, .. } if stage == "deploy"))
        .times(1)
        .return_const(());
    reporter
        .expect_run_stopped()
        .withf(|code, _| *code == ExitCode::EXCEPTION)
        .times(1)
        .return_const(());
    let chain = ChainBuilder::new()
        .shared_stage(failing)
        .reporter(Arc::new(reporter))
        .build(Arc::clone(&lifecycle));
    let terminator = expect_termination(&lifecycle, ExitCode::EXCEPTION);

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::EXCEPTION);
}

#[rstest]
fn teardown_failure_after_clean_stop_is_unclean(lifecycle: Arc<Lifecycle>) {
    let teardown: Arc<dyn Handler> = Arc::new(handler_fn("teardown", |chain, context| {
        chain.proceed(context)?;
        Err(ExecutionError::stage("teardown", DeployFailed))
    }));
    let chain = build(&lifecycle, vec![teardown]);
    let requester = request_exit_once_running(&lifecycle, ExitCode::OK);
    let terminator = expect_termination(&lifecycle, ExitCode::UNCLEAN_SHUTDOWN);

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::UNCLEAN_SHUTDOWN);
    assert!(requester.join().expect("requester should not panic"));
}

#[rstest]
fn panicking_stage_becomes_a_failure(lifecycle: Arc<Lifecycle>) {
    let panicking: Arc<dyn Handler> =
        Arc::new(handler_fn("deploy", |_, _| panic!("descriptor missing")));
    let chain = build(&lifecycle, vec![pass_through("outer"), panicking]);
    lifecycle.first_start(false).expect("first start should succeed");

    let error = chain
        .proceed(&Context::new())
        .expect_err("panic should surface as an error");

    match error {
        ExecutionError::Panicked { stage, message } => {
            assert_eq!(stage, "deploy");
            assert_eq!(message, "descriptor missing");
        }
        other => panic!("expected a panic failure, got {other:?}"),
    }
    assert_eq!(lifecycle.exit_code(), Some(ExitCode::EXCEPTION));
}

#[rstest]
fn protocol_violations_keep_unwinding(lifecycle: Arc<Lifecycle>) {
    let violating: Arc<dyn Handler> = Arc::new(handler_fn("violating", |chain, _| {
        let machine = chain.lifecycle();
        machine.stopping(ExitCode::OK)?;
        machine.last_stop();
        machine.stopping(ExitCode::OK)?;
        Ok(ExitCode::OK)
    }));
    let chain = build(&lifecycle, vec![pass_through("outer"), violating]);
    lifecycle.first_start(false).expect("first start should succeed");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| chain.proceed(&Context::new())));

    let payload = outcome.expect_err("violation should unwind through the chain");
    let violation = payload
        .downcast_ref::<InconsistentState>()
        .expect("payload should be preserved");
    assert_eq!(violation.operation, "stopping");
    assert_eq!(violation.state, LifecycleState::Idle);
}

#[rstest]
fn second_synchronous_run_is_rejected(lifecycle: Arc<Lifecycle>) {
    lifecycle.first_start(false).expect("first start should succeed");
    let chain = build(&lifecycle, vec![pass_through("deploy")]);
    let mut terminator = MockExit::new();
    terminator
        .expect_terminate()
        .with(eq(ExitCode::EXCEPTION))
        .times(1)
        .return_const(());

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::EXCEPTION);
    assert_eq!(lifecycle.state(), LifecycleState::Starting);
}

#[rstest]
fn context_values_flow_down_the_chain(lifecycle: Arc<Lifecycle>) {
    let provider: Arc<dyn Handler> = Arc::new(handler_fn("provider", |chain, context| {
        chain.proceed(&context.with(ExitCode::new(9)))
    }));
    let consumer: Arc<dyn Handler> = Arc::new(handler_fn("consumer", |_, context| {
        context.require::<ExitCode>().copied()
    }));
    let chain = build(&lifecycle, vec![provider, consumer]);
    let terminator = expect_termination(&lifecycle, ExitCode::new(9));

    let code = chain.start_and_exit_with(Context::new(), &terminator);

    assert_eq!(code, ExitCode::new(9));
}

#[rstest]
fn asynchronous_run_reports_requested_code(lifecycle: Arc<Lifecycle>) {
    let chain = build(&lifecycle, vec![pass_through("deploy")]);

    let run = chain
        .start_asynchronously(Context::new())
        .expect("application should come up");
    assert_eq!(lifecycle.state(), LifecycleState::Running);
    assert!(run.request_exit(ExitCode::new(5)));
    let status = run.await_exit().expect("await_exit should succeed");

    assert_eq!(status, ExitStatus::Exited(ExitCode::new(5)));
    run.join().expect("worker should not panic");
    assert_eq!(lifecycle.state(), LifecycleState::Idle);
}

#[rstest]
fn asynchronous_startup_failure_is_returned_to_the_caller(lifecycle: Arc<Lifecycle>) {
    let failing: Arc<dyn Handler> = Arc::new(handler_fn("deploy", |_, _| {
        Err(ExecutionError::stage("deploy", DeployFailed))
    }));
    let chain = build(&lifecycle, vec![failing]);

    let error = chain
        .start_asynchronously(Context::new())
        .expect_err("startup should fail");

    match error {
        ExecutionError::Failed { source } => {
            assert!(matches!(*source, ExecutionError::Stage { .. }));
        }
        other => panic!("expected a delivered failure, got {other:?}"),
    }
    assert_eq!(lifecycle.state(), LifecycleState::Idle);
}

#[rstest]
fn asynchronous_exit_tears_down_a_running_pipeline(lifecycle: Arc<Lifecycle>) {
    let mut reporter = MockReporter::new();
    reporter
        .expect_run_starting()
        .with(eq(true))
        .times(1)
        .return_const(());
    reporter.expect_async_exit().times(1).return_const(());
    let chain = ChainBuilder::new()
        .shared_stage(pass_through("deploy"))
        .reporter(Arc::new(reporter))
        .build(Arc::clone(&lifecycle));
    let run = chain
        .start_asynchronously(Context::new())
        .expect("application should come up");

    lifecycle.signal_async_exit_and_await_term();

    assert_eq!(lifecycle.state(), LifecycleState::Dead);
    run.join().expect("worker should not panic");
    assert!(matches!(
        chain.start_asynchronously(Context::new()),
        Err(ref error) if error.is_async_exit()
    ));
}

#[rstest]
fn stage_names_follow_build_order(lifecycle: Arc<Lifecycle>) {
    let chain = build(
        &lifecycle,
        vec![pass_through("config"), pass_through("signals"), pass_through("app")],
    );

    assert_eq!(chain.stage_names(), vec!["config", "signals", "app"]);
}

fn overriding_chain(lifecycle: &Arc<Lifecycle>) -> Chain {
    let override_code: Arc<dyn Handler> = Arc::new(handler_fn("override", |chain, context| {
        chain.proceed(context)?;
        Ok(ExitCode::new(9))
    }));
    build(lifecycle, vec![override_code, pass_through("serve")])
}

#[rstest]
fn both_entry_points_exit_with_the_recorded_code() {
    let sync_lifecycle = Arc::new(Lifecycle::new());
    let requester = request_exit_once_running(&sync_lifecycle, ExitCode::new(5));
    let terminator = expect_termination(&sync_lifecycle, ExitCode::new(5));
    let sync_code =
        overriding_chain(&sync_lifecycle).start_and_exit_with(Context::new(), &terminator);
    assert!(requester.join().expect("requester should not panic"));

    let async_lifecycle = Arc::new(Lifecycle::new());
    let run = overriding_chain(&async_lifecycle)
        .start_asynchronously(Context::new())
        .expect("application should come up");
    assert!(run.request_exit(ExitCode::new(5)));
    let async_status = run.await_exit().expect("await_exit should succeed");
    run.join().expect("worker should not panic");

    assert_eq!(sync_code, ExitCode::new(5));
    assert_eq!(async_status, ExitStatus::Exited(sync_code));
}
