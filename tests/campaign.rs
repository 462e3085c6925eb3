use mutandis::mutant::CONSTRUCTOR;
use mutandis::{
    Campaign, Execution, Mutant, Mutation, MutationKind, Op, Outcome, Program, Signature, Status,
    Telemetry, Type, UnitId,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mutandis-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn count_ops(program: &Program, pred: impl Fn(&Op) -> bool) -> usize {
    program
        .units()
        .flat_map(|(_, unit)| unit.methods())
        .flat_map(|m| m.body().instrs())
        .filter(|i| pred(i.op()))
        .count()
}

fn constructor_of(program: &Program, unit: UnitId) -> mutandis::MethodId {
    program
        .unit(unit)
        .and_then(|u| u.method_named(CONSTRUCTOR))
        .map(|m| m.id())
        .expect("unit has a constructor")
}

#[test]
fn accepted_call_is_kept_on_the_stack() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("accept");

    let mut session = Campaign::new().seed(1).result_dir(&dir).start(
        |execution: &Execution<'_>| {
            assert!(execution.workdir.is_dir());
            assert_eq!(execution.artifacts.len(), execution.program.unit_count());
            Outcome::Normal
        },
    )?;
    let main = session.program().main();
    session.setup(|_, program| {
        program
            .unit_mut(main)
            .expect("main unit")
            .add_method(Signature::new("callee", vec![], Type::Void).with_static(true))
    })?;

    let status = session.step_with(|ctx, program| {
        let init = constructor_of(program, main);
        Mutation::call_method(ctx, program, main, init)
    })?;

    assert_eq!(status, Status::Success);
    assert_eq!(session.stack_len(), 1);
    assert_eq!(session.stack()[0].kind(), MutationKind::CallMethod);
    assert_eq!(count_ops(session.program(), |op| matches!(op, Op::Invoke(_))), 1);
    assert_eq!(count_ops(session.program(), |op| matches!(op, Op::CheckType { .. })), 0);
    assert_eq!(session.telemetry().counters(MutationKind::CallMethod).success, 1);
    assert_eq!(session.telemetry().stack_size(), 1);
    assert!(!dir.join("CallMethod-1").exists());

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn violating_mutation_is_kept_and_persisted() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("violation");

    let mut session = Campaign::new()
        .seed(2)
        .result_dir(&dir)
        .start(|_: &Execution<'_>| Outcome::Violation("Test0 is not a Test1".into()))?;
    let main = session.program().main();

    let status = session.step_with(|ctx, program| Mutation::add_method(ctx, program, main))?;
    assert_eq!(status, Status::Violates);
    assert_eq!(session.stack_len(), 1);
    assert_eq!(session.program().unit(main).expect("main").methods().len(), 2);
    assert_eq!(session.telemetry().counters(MutationKind::AddMethod).violations, 1);

    let evidence = dir.join("AddMethod-1");
    assert!(evidence.join("Test0.bin").is_file());
    assert!(evidence.join("Test0.txt").is_file());
    assert_eq!(fs::read_to_string(evidence.join("violation.txt"))?, "Test0 is not a Test1");
    assert_eq!(session.report().persisted, 1);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn violation_evidence_includes_the_checks() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("evidence");

    let mut session = Campaign::new()
        .seed(3)
        .result_dir(&dir)
        .start(|_: &Execution<'_>| Outcome::Violation("confused".into()))?;
    let main = session.program().main();
    session.setup(|_, program| {
        program
            .unit_mut(main)
            .expect("main unit")
            .add_method(Signature::new("callee", vec![], Type::Int).with_static(true))
    })?;

    let status = session.step_with(|ctx, program| {
        let init = constructor_of(program, main);
        Mutation::call_method(ctx, program, main, init)
    })?;
    assert_eq!(status, Status::Violates);

    // The saved dump was taken while instrumented; the live program is not.
    let saved = fs::read_to_string(dir.join("CallMethod-1").join("Test0.txt"))?;
    assert!(saved.contains("check this instanceof Test0"));
    assert_eq!(count_ops(session.program(), |op| matches!(op, Op::CheckType { .. })), 0);
    assert_eq!(count_ops(session.program(), |op| matches!(op, Op::Invoke(_))), 1);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn interrupted_and_crashed_mutations_are_undone() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("undone");

    let mut calls = 0;
    let mut session = Campaign::new().seed(4).result_dir(&dir).start(move |_: &Execution<'_>| {
        calls += 1;
        if calls % 2 == 0 {
            Outcome::Interrupted
        } else {
            Outcome::Crashed("segfault".into())
        }
    })?;
    let main = session.program().main();
    let before = session.program().to_string();

    let first = session.step_with(|ctx, program| Mutation::add_field(ctx, program, main))?;
    let second = session.step_with(|ctx, program| Mutation::add_method(ctx, program, main))?;
    assert_eq!((first, second), (Status::Crashed, Status::Interrupted));
    assert_eq!(session.program().to_string(), before);
    assert_eq!(session.stack_len(), 0);
    assert_eq!(session.telemetry().totals().crashed, 2);
    assert_eq!(fs::read_dir(&dir)?.count(), 0);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn failed_construction_is_counted_and_changes_nothing() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("failed");

    let mut session = Campaign::new()
        .seed(5)
        .result_dir(&dir)
        .seed_unit(Mutant::new("Seed"))
        .start(|_: &Execution<'_>| -> Outcome { panic!("nothing should run") })?;
    let before = session.program().to_string();

    let status = session.step_with(|ctx, program| {
        let main = program.main();
        program.random_method_mutation(ctx, main)
    })?;

    assert_eq!(status, Status::Failed);
    assert_eq!(session.program().to_string(), before);
    assert_eq!(session.telemetry().totals().failed, 1);
    assert_eq!(session.telemetry().executions(), 0);
    assert_eq!(fs::read_dir(&dir)?.count(), 0);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

/// Accept four mutations, then crash until one stall rollback has happened.
/// Returns how many mutations are left on the stack.
fn stall_once(seed: u64, dir: &Path) -> anyhow::Result<usize> {
    let mut calls = 0;
    let mut session = Campaign::new()
        .seed(seed)
        .stall_window(5)
        .result_dir(dir)
        .start(move |_: &Execution<'_>| {
            calls += 1;
            if calls <= 4 {
                Outcome::Normal
            } else {
                Outcome::Crashed("boom".into())
            }
        })?;
    let main = session.program().main();

    // dumps[n] is the program with the first n accepted mutations.
    let mut dumps = vec![session.program().to_string()];
    for _ in 0..4 {
        let status = session.step_with(|ctx, program| Mutation::add_field(ctx, program, main))?;
        assert_eq!(status, Status::Success);
        dumps.push(session.program().to_string());
    }
    assert_eq!(session.stack_len(), 4);

    // One crash completes a window that had accepts; five more stall.
    for _ in 0..6 {
        let status = session.step_with(|ctx, program| Mutation::add_field(ctx, program, main))?;
        assert_eq!(status, Status::Crashed);
    }

    let left = session.stack_len();
    assert!(left <= 4);
    assert_eq!(session.program().to_string(), dumps[left]);
    assert_eq!(session.telemetry().stack_size(), left);
    assert!(!session.telemetry().is_stalled());
    Ok(left)
}

#[test]
fn stall_rolls_back_a_random_prefix_of_the_stack() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("stall");

    let mut rolled_back = false;
    for seed in 0..20 {
        rolled_back |= stall_once(seed, &dir)? < 4;
    }
    assert!(rolled_back);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn stall_rollback_count_is_uniform() -> anyhow::Result<()> {
    let dir = scratch("stall-uniform");

    // Four kept mutations, so zero through four are popped equally often.
    let runs = 1000;
    let mut left = [0usize; 5];
    for seed in 0..runs {
        left[stall_once(seed, &dir)?] += 1;
    }
    for (n, count) in left.iter().enumerate() {
        let share = *count as f64 / runs as f64;
        assert!((share - 0.2).abs() < 0.06, "{n} left in {share} of runs: {left:?}");
    }

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn stack_never_exceeds_its_limit() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("limit");

    let mut session = Campaign::new()
        .seed(6)
        .stack_limit(3)
        .result_dir(&dir)
        .start(|_: &Execution<'_>| Outcome::Normal)?;

    for _ in 0..300 {
        session.step()?;
        assert!(session.stack_len() < 3);
        assert_eq!(session.telemetry().stack_size(), session.stack_len());
    }
    session.program().check_references()?;

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn staging_failure_is_fatal_and_leaves_the_program_intact() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("fatal");

    let mut session = Campaign::new()
        .seed(7)
        .result_dir(&dir)
        .start(|_: &Execution<'_>| Outcome::Normal)?;
    let main = session.program().main();
    let before = session.program().to_string();

    // Working directories cannot be created under a plain file.
    fs::remove_dir_all(&dir)?;
    fs::write(&dir, b"not a directory")?;

    let err = session
        .step_with(|ctx, program| Mutation::add_field(ctx, program, main))
        .expect_err("workdir cannot be created");
    assert!(err.is_io());
    assert_eq!(session.program().to_string(), before);

    // The postmortem is the program with the in-flight field still applied.
    let postmortem = err.postmortem().expect("fatal errors carry the program");
    assert!(postmortem.starts_with("class Test0"));
    assert_ne!(postmortem, before);
    assert!(err.to_string().contains(postmortem));
    assert_eq!(session.stack_len(), 0);

    fs::remove_file(&dir)?;
    Ok(())
}

#[test]
fn fatal_error_from_run_carries_the_last_program() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("fatal-run");

    let mut calls = 0;
    let target = dir.clone();
    let err = Campaign::new()
        .seed(9)
        .iterations(Some(1000))
        .result_dir(&dir)
        .run(move |_: &Execution<'_>| {
            calls += 1;
            if calls == 20 {
                // The workdir cannot be removed once its parent is a file.
                fs::remove_dir_all(&target).expect("result dir is a directory");
                fs::write(&target, b"not a directory").expect("replace with a file");
            }
            Outcome::Normal
        })
        .expect_err("the result dir became a file");

    assert!(err.is_io());
    let postmortem = err.postmortem().expect("fatal errors carry the program");
    assert!(postmortem.contains("class Test0"), "{postmortem}");

    fs::remove_file(&dir)?;
    Ok(())
}

#[test]
fn run_honours_the_iteration_budget_and_stop_flag() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("run");

    let report = Campaign::new()
        .seed(8)
        .iterations(Some(50))
        .result_dir(&dir)
        .run(|_: &Execution<'_>| Outcome::Normal)?;
    assert_eq!(report.iterations, 50);
    let t = report.totals;
    assert_eq!(t.success + t.failed + t.crashed + t.violations, 50);
    assert!(report.snapshot.contains("Mutation type"));

    let mut session = Campaign::new()
        .seed(8)
        .result_dir(&dir)
        .start(|_: &Execution<'_>| Outcome::Normal)?;
    session.stop_handle().store(true, Ordering::Relaxed);
    assert_eq!(session.run()?.iterations, 0);

    fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn same_seed_same_campaign() -> anyhow::Result<()> {
    let _ = env_logger::try_init();
    let dir = scratch("replay");

    let mut dumps = vec![];
    for _ in 0..2 {
        let mut session = Campaign::new()
            .seed(0xdead_beef)
            .stack_limit(50)
            .result_dir(&dir)
            .start(|execution: &Execution<'_>| {
                if execution.artifacts.len() > 2 {
                    Outcome::Crashed("too many units".into())
                } else {
                    Outcome::Normal
                }
            })?;
        for _ in 0..200 {
            session.step()?;
        }
        dumps.push(session.program().to_string());
    }
    assert_eq!(dumps[0], dumps[1]);

    fs::remove_dir_all(&dir)?;
    Ok(())
}
