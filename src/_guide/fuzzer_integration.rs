/*!

# Integrating with a Coverage-Guided Fuzzer

[`Session::run`][crate::Session::run] is a complete fuzzing loop on its own,
but the building blocks also fit inside a coverage-guided fuzzer that wants
structure-aware mutations of VM programs:

* Keep a [`Program`][crate::Program] and its [`Context`][crate::Context]
  alive across calls, since units are addressed by stable handles rather than
  by re-parsing bytes.

* In the custom mutator, seed a fresh context from the fuzzer's seed, apply
  [`Program::random_mutation`][crate::Program::random_mutation], and hand the
  encoded [`Artifact`][crate::Artifact]s back to the fuzzer.

* In the fuzz target, load the artifacts into the VM under test.

## Example: `libfuzzer`

This example keeps one program per fuzzing process and lets `libfuzzer`
decide which mutated programs are interesting. The fuzz input is the encoded
main unit; `load_and_run` stands in for your VM's class loader.

```rust,ignore
use libfuzzer_sys::{fuzz_mutator, fuzz_target};
use mutandis::{Context, Program};
use std::sync::Mutex;

static PROGRAM: Mutex<Option<(Context, Program)>> = Mutex::new(None);

fuzz_target!(|data: &[u8]| {
    load_and_run(data);
});

fuzz_mutator!(|data: &mut [u8], size: usize, max_size: usize, seed: u32| {
    let mut guard = PROGRAM.lock().unwrap();
    let (ctx, program) = guard.get_or_insert_with(|| {
        let mut ctx = Context::new(0);
        let program = Program::new("Fuzz", &mut ctx);
        (ctx, program)
    });

    // Reseed so libfuzzer's seed picks the mutation.
    *ctx = Context::new(seed.into());
    if let Err(failed) = program.random_mutation(ctx) {
        failed.undo(program);
        return size;
    }

    let main = program.main();
    let bytes = mutandis::codegen::encode(program.unit(main).unwrap());
    let new_size = std::cmp::min(max_size, bytes.len());
    data[..new_size].copy_from_slice(&bytes[..new_size]);
    new_size
});
# fn load_and_run(_: &[u8]) {}
```

 */
