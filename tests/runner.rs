use mutandis::{Context, Execution, Outcome, Program, Runner, ThreadRunner};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

fn execute(runner: &mut impl Runner, timeout: Duration) -> Outcome {
    let mut ctx = Context::new(0);
    let program = Program::new("Test", &mut ctx);
    let artifacts = program.artifacts();
    runner.run(&Execution {
        program: &program,
        artifacts: &artifacts,
        timeout,
        workdir: Path::new("."),
    })
}

#[test]
fn thread_runner_returns_the_executor_outcome() {
    let _ = env_logger::try_init();

    let mut runner = ThreadRunner::new(|artifacts| {
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].name, "Test0");
        Outcome::Violation("caught".into())
    });
    assert_eq!(
        execute(&mut runner, Duration::from_secs(5)),
        Outcome::Violation("caught".into())
    );
}

#[test]
fn thread_runner_times_out() {
    let _ = env_logger::try_init();

    let mut runner = ThreadRunner::new(|_| {
        thread::sleep(Duration::from_millis(500));
        Outcome::Normal
    });
    let start = Instant::now();
    assert_eq!(execute(&mut runner, Duration::from_millis(20)), Outcome::Interrupted);
    assert!(start.elapsed() < Duration::from_millis(400));
}

#[test]
fn thread_runner_reports_panics_as_crashes() {
    let _ = env_logger::try_init();

    let mut runner = ThreadRunner::new(|_| panic!("stack overflow in Test0.m0")).stack_size(256 * 1024);
    match execute(&mut runner, Duration::from_secs(5)) {
        Outcome::Crashed(cause) => assert!(cause.contains("stack overflow in Test0.m0"), "{cause}"),
        other => panic!("expected a crash, got {other:?}"),
    }
}

#[test]
fn closures_are_runners() {
    let mut seen = 0;
    let mut runner = |execution: &Execution<'_>| {
        seen += execution.artifacts.len();
        Outcome::Normal
    };
    assert_eq!(execute(&mut runner, Duration::from_secs(1)), Outcome::Normal);
    assert_eq!(seen, 1);
}
