/*!

# Writing a Runner for Your VM

The engine never executes candidates itself. A [`Runner`][crate::Runner]
receives an [`Execution`][crate::Execution] with the encoded units, the
timeout, and a scratch directory, and reports how the run ended as an
[`Outcome`][crate::Outcome]:

* [`Outcome::Normal`][crate::Outcome::Normal] keeps the mutation.

* [`Outcome::Violation`][crate::Outcome::Violation] means an injected check
  fired. The mutation is kept and the instrumented program is written to the
  working directory, which survives the iteration.

* [`Outcome::Interrupted`][crate::Outcome::Interrupted] and
  [`Outcome::Crashed`][crate::Outcome::Crashed] undo the mutation.

## Checks

The default [`TypeConfusion`][crate::TypeConfusion] contract inserts
[`Op::CheckType`][crate::Op::CheckType] instructions right before a body's
return. Your code generator should lower them to an `instanceof` test that
reports a violation (for example by throwing a dedicated exception) when the
local does not hold an instance of the expected class.

## Out-of-process runners

Running candidates in a child process is the most robust option: a hung or
crashed VM cannot take the campaign down with it. Write the artifacts into
`execution.workdir`, spawn the VM there, and map its exit status and output
onto an `Outcome`. Kill the child when the timeout elapses and report
`Interrupted`.

## In-process runners

If your VM is a Rust library, [`ThreadRunner`][crate::ThreadRunner] calls it
on a fresh worker thread with an optional stack size, turning panics into
`Crashed` and missed deadlines into `Interrupted`:

```
use mutandis::{Campaign, Outcome, ThreadRunner};
use std::time::Duration;

# fn main() -> mutandis::Result<()> {
# let dir = std::env::temp_dir().join(format!("mutandis-guide-{}", std::process::id()));
let runner = ThreadRunner::new(|artifacts| {
    // Hand `artifacts` to the VM here.
    if artifacts.iter().all(|a| a.bytes.starts_with(b"MTDS")) {
        Outcome::Normal
    } else {
        Outcome::Crashed("bad magic".into())
    }
})
.stack_size(2 << 20);

let report = Campaign::new()
    .iterations(Some(20))
    .timeout(Duration::from_secs(5))
    .result_dir(&dir)
    .run(runner)?;
assert_eq!(report.totals.crashed, 0);
# std::fs::remove_dir_all(&dir)?;
# Ok(())
# }
```

 */
