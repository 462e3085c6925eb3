use mutandis::mutant::{Constant, Value};
use mutandis::ty::BUILTIN_CLASSES;
use mutandis::{
    Context, Granularity, Mutant, Mutation, MutationError, MutationKind, Op, Program, Signature,
    Type,
};
use std::collections::{BTreeMap, BTreeSet};

/// A program after `steps` random mutations, with a static callee planted in
/// the main unit so that calls always have a target.
fn grown(seed: u64, steps: usize) -> anyhow::Result<(Context, Program, Vec<Mutation>)> {
    let mut ctx = Context::new(seed);
    let mut program = Program::new("Test", &mut ctx);
    let main = program.main();
    program
        .unit_mut(main)
        .expect("main unit")
        .add_method(Signature::new("seeded", vec![], Type::Int).with_static(true))?;

    let mut stack = vec![];
    for _ in 0..steps {
        match program.random_mutation(&mut ctx) {
            Ok(mutation) => stack.push(mutation),
            Err(failed) => failed.undo(&mut program),
        }
    }
    Ok((ctx, program, stack))
}

fn attempt(
    ctx: &mut Context,
    program: &mut Program,
    kind: MutationKind,
) -> Result<Mutation, MutationError> {
    let unit = program.random_unit(ctx);
    let methods: Vec<_> = program
        .unit(unit)
        .expect("random unit exists")
        .methods()
        .iter()
        .map(|m| m.id())
        .collect();
    let method = methods[ctx.uint_below(methods.len())];
    match kind {
        MutationKind::AddUnit => Mutation::add_unit(ctx, program),
        MutationKind::AddField => Mutation::add_field(ctx, program, unit),
        MutationKind::AddMethod => Mutation::add_method(ctx, program, unit),
        MutationKind::AddLocal => Mutation::add_local(ctx, program, unit, method),
        MutationKind::CallMethod => Mutation::call_method(ctx, program, unit, method),
    }
}

#[test]
fn undo_restores_the_dump_for_every_kind() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    let mut undone = BTreeMap::new();
    for seed in 0..20 {
        let (mut ctx, mut program, _) = grown(seed, 100)?;
        for kind in MutationKind::ALL {
            for _ in 0..10 {
                let before = program.to_string();
                match attempt(&mut ctx, &mut program, kind) {
                    Ok(mutation) => {
                        assert_eq!(mutation.kind(), kind);
                        assert_eq!(mutation.granularity(), kind.granularity());
                        mutation.undo(&mut program)?;
                        *undone.entry(kind).or_insert(0) += 1;
                    }
                    Err(failed) => {
                        assert_eq!(failed.kind(), kind);
                        failed.undo(&mut program);
                    }
                }
                assert_eq!(program.to_string(), before, "{kind} did not undo exactly");
            }
        }
    }

    for kind in MutationKind::ALL {
        assert!(undone.get(&kind).copied().unwrap_or(0) > 0, "{kind} never applied");
    }
    Ok(())
}

#[test]
fn unwinding_the_stack_restores_the_start() -> anyhow::Result<()> {
    let mut ctx = Context::new(11);
    let mut program = Program::new("Test", &mut ctx);
    let start = program.to_string();

    let mut stack = vec![];
    for _ in 0..500 {
        match program.random_mutation(&mut ctx) {
            Ok(mutation) => stack.push(mutation),
            Err(failed) => failed.undo(&mut program),
        }
    }
    assert!(!stack.is_empty());

    while let Some(mutation) = stack.pop() {
        mutation.undo(&mut program)?;
    }
    assert_eq!(program.to_string(), start);
    assert_eq!(program.unit_count(), 1);
    Ok(())
}

#[test]
fn random_programs_stay_well_formed() -> anyhow::Result<()> {
    let _ = env_logger::try_init();

    for seed in 0..10 {
        let (_, program, stack) = grown(seed, 400)?;
        program.check_references()?;

        let calls = stack
            .iter()
            .filter(|m| m.kind() == MutationKind::CallMethod)
            .count();
        assert!(calls > 0, "seed {seed} never inserted a call");
    }
    Ok(())
}

#[test]
fn unit_names_are_unique_and_never_reserved() -> anyhow::Result<()> {
    let mut ctx = Context::new(0);
    assert!(ctx.reserve_name("Test3"));

    let mut program = Program::new("Test", &mut ctx).with_max_units(1000);
    let mut ids = vec![];
    for _ in 0..200 {
        ids.push(program.generate_unit(&mut ctx));
    }

    // A removed unit's name is not handed out again.
    let removed = program.remove_unit(ids[10])?;
    program.generate_unit(&mut ctx);

    let names: Vec<&str> = program.units().map(|(_, u)| u.name()).collect();
    let distinct: BTreeSet<&str> = names.iter().copied().collect();
    assert_eq!(names.len(), distinct.len());
    assert!(!distinct.contains("Test3"));
    assert!(!distinct.contains(removed.name()));
    for builtin in BUILTIN_CLASSES {
        assert!(!distinct.contains(builtin));
    }
    for name in &names {
        assert!(ctx.is_reserved(name));
    }
    Ok(())
}

#[test]
fn method_mutation_on_a_unit_without_methods_fails_cleanly() -> anyhow::Result<()> {
    let mut ctx = Context::new(9);
    let mut program = Program::from_seed_unit("Test", &mut ctx, Mutant::new("Seed"))?;
    let main = program.main();
    let before = program.to_string();

    for _ in 0..20 {
        let failed = program
            .random_method_mutation(&mut ctx, main)
            .expect_err("no method to mutate");
        assert!(failed.error().is_no_candidate());
        assert_eq!(failed.kind().granularity(), Granularity::Method);
        failed.undo(&mut program);
        assert_eq!(program.to_string(), before);
    }
    Ok(())
}

#[test]
fn seed_unit_name_must_be_free() {
    let mut ctx = Context::new(0);
    assert!(Program::from_seed_unit("Test", &mut ctx, Mutant::empty("String")).is_err());
}

#[test]
fn unit_cap_turns_program_mutations_into_class_mutations() -> anyhow::Result<()> {
    let mut ctx = Context::new(1);
    let mut program = Program::new("Test", &mut ctx).with_max_units(1);

    let failed = Mutation::add_unit(&mut ctx, &mut program).expect_err("cap reached");
    assert!(failed.error().is_no_candidate());

    for _ in 0..2000 {
        match program.random_mutation(&mut ctx) {
            Ok(mutation) => assert_ne!(mutation.kind(), MutationKind::AddUnit),
            Err(failed) => {
                assert_ne!(failed.kind(), MutationKind::AddUnit);
                failed.undo(&mut program);
            }
        }
    }
    assert_eq!(program.unit_count(), 1);
    Ok(())
}

#[test]
fn calls_only_read_assigned_locals() -> anyhow::Result<()> {
    let mut ctx = Context::new(21);
    let mut program = Program::new("Test", &mut ctx);
    let main = program.main();
    let unit = program.unit_mut(main).expect("main unit");
    unit.add_method(Signature::new("sink", vec![Type::Int, Type::object("String")], Type::Void).with_static(true))?;
    let caller = unit.add_method(Signature::new("caller", vec![], Type::Void))?;

    // Nothing of type int is live yet.
    let failed = Mutation::call_method(&mut ctx, &mut program, main, caller).expect_err("no int");
    assert!(failed.error().is_no_candidate());

    let unit = program.unit_mut(main).expect("main unit");
    let int = unit.add_local(caller, Type::Int)?;
    let string = unit.add_local(caller, Type::object("String"))?;
    unit.insert_instr(
        caller,
        0,
        Op::Assign {
            dst: int,
            value: Value::Const(Constant::Int(7)),
        },
    )?;
    unit.insert_instr(
        caller,
        1,
        Op::Assign {
            dst: string,
            value: Value::Null,
        },
    )?;

    for _ in 0..50 {
        let mutation = Mutation::call_method(&mut ctx, &mut program, main, caller)?;
        let Mutation::CallMethod { call, .. } = &mutation else {
            panic!("expected a call");
        };
        let body = program
            .unit(main)
            .and_then(|u| u.method(caller))
            .expect("caller")
            .body();
        // Both assignments come first.
        assert!(body.position(*call).expect("inserted") >= 2);
        program.check_references()?;
        mutation.undo(&mut program)?;
    }
    Ok(())
}
