//! The boundary to whatever actually runs candidate programs.
//!
//! The engine never executes code itself. It hands a [`Runner`] the encoded
//! program and gets back an [`Outcome`]; violations, timeouts, and crashes are
//! ordinary values here, not errors.

use crate::codegen::Artifact;
use crate::log;
use crate::program::Program;
use std::any::Any;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// How an execution ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The program ran to completion.
    Normal,
    /// An injected contract check fired; carries what the runtime reported.
    Violation(String),
    /// The program was interrupted, typically by the timeout.
    Interrupted,
    /// Any other abnormal termination; carries the cause.
    Crashed(String),
}

/// Everything a runner gets to see about one candidate.
#[derive(Debug)]
pub struct Execution<'a> {
    /// The candidate program, contract checks included.
    pub program: &'a Program,
    /// The program's units, encoded, in load order.
    pub artifacts: &'a [Artifact],
    /// How long the candidate may run.
    pub timeout: Duration,
    /// A scratch directory reserved for this execution.
    pub workdir: &'a Path,
}

/// Runs candidate programs.
///
/// Implementations must honour the timeout: a candidate that does not finish
/// in time is reported as [`Outcome::Interrupted`] rather than blocking the
/// campaign.
///
/// Any `FnMut(&Execution) -> Outcome` closure is a runner, which is handy in
/// tests:
///
/// ```
/// use mutandis::{Execution, Outcome, Runner};
///
/// fn assert_runner(_: impl Runner) {}
/// assert_runner(|_: &Execution<'_>| Outcome::Normal);
/// ```
pub trait Runner {
    /// Run one candidate.
    fn run(&mut self, execution: &Execution<'_>) -> Outcome;
}

impl<F> Runner for F
where
    F: FnMut(&Execution<'_>) -> Outcome,
{
    fn run(&mut self, execution: &Execution<'_>) -> Outcome {
        self(execution)
    }
}

/// Runs candidates on a fresh worker thread and waits for them up to the
/// timeout.
///
/// The executor receives the encoded units and returns an [`Outcome`]. A
/// panicking executor is reported as [`Outcome::Crashed`]. A worker that
/// misses the deadline is detached and the execution is reported as
/// [`Outcome::Interrupted`]; threads cannot be killed, so executors that may
/// hang should poll a deadline of their own.
///
/// # Example
///
/// ```
/// use mutandis::{Outcome, ThreadRunner};
///
/// let runner = ThreadRunner::new(|artifacts| {
///     if artifacts.is_empty() {
///         Outcome::Crashed("nothing to load".into())
///     } else {
///         Outcome::Normal
///     }
/// })
/// .stack_size(1 << 20);
/// # let _ = runner;
/// ```
pub struct ThreadRunner {
    execute: Arc<dyn Fn(Vec<Artifact>) -> Outcome + Send + Sync>,
    stack_size: Option<usize>,
}

impl ThreadRunner {
    /// A runner that calls `execute` on a worker thread.
    pub fn new(execute: impl Fn(Vec<Artifact>) -> Outcome + Send + Sync + 'static) -> Self {
        ThreadRunner {
            execute: Arc::new(execute),
            stack_size: None,
        }
    }

    /// Bound the worker's stack, and with it the candidate's call depth.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl std::fmt::Debug for ThreadRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRunner")
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}

impl Runner for ThreadRunner {
    fn run(&mut self, execution: &Execution<'_>) -> Outcome {
        let (tx, rx) = mpsc::channel();
        let execute = Arc::clone(&self.execute);
        let artifacts = execution.artifacts.to_vec();

        let mut builder = thread::Builder::new().name("mutandis-runner".to_string());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let handle = match builder.spawn(move || {
            let outcome = execute(artifacts);
            let _ = tx.send(outcome);
        }) {
            Ok(handle) => handle,
            Err(e) => return Outcome::Crashed(format!("failed to spawn runner thread: {e}")),
        };

        match rx.recv_timeout(execution.timeout) {
            Ok(outcome) => {
                let _ = handle.join();
                outcome
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::debug!("execution exceeded {:?}; detaching worker", execution.timeout);
                Outcome::Interrupted
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => match handle.join() {
                Err(payload) => Outcome::Crashed(panic_message(&*payload)),
                Ok(()) => Outcome::Crashed("runner exited without an outcome".to_string()),
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
