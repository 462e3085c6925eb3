//! The feedback loop.
//!
//! A [`Campaign`] is the configuration; [`Campaign::start`] turns it into a
//! [`Session`] that owns the evolving program and drives it one iteration at a
//! time:
//!
//! 1. propose and apply a random mutation,
//! 2. instrument the edited body with contract checks,
//! 3. hand the program to the [`Runner`],
//! 4. retract the checks and keep or undo the mutation depending on the
//!    outcome,
//! 5. roll back a random batch of kept mutations when the campaign stalls or
//!    the undo stack is full.
//!
//! Only I/O failures around the per-iteration working directory end the
//! campaign; everything else is counted and the loop moves on.

use crate::contract::{Contract, TypeConfusion};
use crate::exec::{Execution, Outcome, Runner};
use crate::log;
use crate::mutant::Mutant;
use crate::mutation::{Mutation, MutationError};
use crate::program::{Program, MAX_UNITS};
use crate::telemetry::{Counters, Status, StatusScreen, Telemetry};
use crate::{Context, Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a fuzzing campaign.
///
/// # Example
///
/// ```no_run
/// use mutandis::{Campaign, Execution, Outcome};
/// use std::time::Duration;
///
/// # fn main() -> mutandis::Result<()> {
/// let report = Campaign::new()
///     .seed(42)
///     .iterations(Some(10_000))
///     .timeout(Duration::from_millis(500))
///     .stack_limit(200)
///     .result_dir("results")
///     .run(|execution: &Execution<'_>| {
///         // Load `execution.artifacts` into the VM under test here.
///         let _ = execution;
///         Outcome::Normal
///     })?;
///
/// println!("{}", report.snapshot);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Campaign {
    seed: Option<u64>,
    iterations: Option<u64>,
    timeout: Duration,
    stack_limit: Option<usize>,
    stall_window: u64,
    max_units: usize,
    result_dir: PathBuf,
    base_name: String,
    contracts: Vec<Arc<dyn Contract>>,
    report_interval: Duration,
    seed_unit: Option<Mutant>,
}

impl Default for Campaign {
    fn default() -> Campaign {
        Campaign::new()
    }
}

impl Campaign {
    /// Create a new `Campaign` with the default configuration.
    pub fn new() -> Campaign {
        Campaign {
            seed: None,
            iterations: None,
            timeout: Duration::from_millis(1000),
            stack_limit: None,
            stall_window: 100,
            max_units: MAX_UNITS,
            result_dir: PathBuf::from("results"),
            base_name: "Test".to_string(),
            contracts: vec![Arc::new(TypeConfusion) as Arc<dyn Contract>],
            report_interval: Duration::from_secs(1),
            seed_unit: None,
        }
    }

    /// Seed the random source, making the campaign reproducible for a
    /// deterministic runner.
    pub fn seed(&mut self, seed: u64) -> &mut Campaign {
        self.seed = Some(seed);
        self
    }

    /// Stop after this many iterations. `None`, the default, runs until
    /// stopped through [`Session::stop_handle`].
    pub fn iterations(&mut self, iterations: Option<u64>) -> &mut Campaign {
        self.iterations = iterations;
        self
    }

    /// How long each execution may take.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Campaign {
        self.timeout = timeout;
        self
    }

    /// Cap the number of kept mutations. Reaching the cap rolls back a random
    /// batch of at least one.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn stack_limit(&mut self, limit: usize) -> &mut Campaign {
        assert!(limit > 0, "stack limit must allow at least one mutation");
        self.stack_limit = Some(limit);
        self
    }

    /// How many iterations without an accepted mutation count as a stall.
    ///
    /// # Panics
    ///
    /// Panics if `window` is zero.
    pub fn stall_window(&mut self, window: u64) -> &mut Campaign {
        assert!(window > 0, "stall window must not be empty");
        self.stall_window = window;
        self
    }

    /// Cap the number of units in the program.
    pub fn max_units(&mut self, max_units: usize) -> &mut Campaign {
        self.max_units = max_units;
        self
    }

    /// Where working directories and violation evidence go.
    pub fn result_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Campaign {
        self.result_dir = dir.into();
        self
    }

    /// The prefix of generated unit names.
    pub fn base_name(&mut self, base_name: impl Into<String>) -> &mut Campaign {
        self.base_name = base_name.into();
        self
    }

    /// Add a contract to inject into every edited body.
    pub fn contract(&mut self, contract: impl Contract + 'static) -> &mut Campaign {
        self.contracts.push(Arc::new(contract));
        self
    }

    /// Drop every configured contract, including the default
    /// [`TypeConfusion`].
    pub fn clear_contracts(&mut self) -> &mut Campaign {
        self.contracts.clear();
        self
    }

    /// How often [`Session::run`] logs the status screen.
    pub fn report_interval(&mut self, interval: Duration) -> &mut Campaign {
        self.report_interval = interval;
        self
    }

    /// Start from `unit` instead of an empty main unit.
    pub fn seed_unit(&mut self, unit: Mutant) -> &mut Campaign {
        self.seed_unit = Some(unit);
        self
    }

    /// Create the result directory and the initial program.
    pub fn start<R: Runner>(&self, runner: R) -> Result<Session<R>> {
        fs::create_dir_all(&self.result_dir)?;

        let mut ctx = self.seed.map_or_else(Context::default, Context::new);
        let program = match &self.seed_unit {
            Some(unit) => Program::from_seed_unit(self.base_name.as_str(), &mut ctx, unit.clone())?,
            None => Program::new(self.base_name.as_str(), &mut ctx),
        }
        .with_max_units(self.max_units);
        log::debug!("starting campaign in {}", self.result_dir.display());

        Ok(Session {
            runner,
            ctx,
            program,
            contracts: self.contracts.clone(),
            stack: Vec::new(),
            telemetry: Arc::new(StatusScreen::new(self.stall_window)),
            stop: Arc::new(AtomicBool::new(false)),
            iteration: 0,
            iterations: self.iterations,
            timeout: self.timeout,
            stack_limit: self.stack_limit,
            result_dir: self.result_dir.clone(),
            report_interval: self.report_interval,
            persisted: 0,
        })
    }

    /// Start a session and run it to completion.
    pub fn run<R: Runner>(&self, runner: R) -> Result<Report> {
        self.start(runner)?.run()
    }
}

/// What a finished campaign did.
#[derive(Clone, Debug)]
pub struct Report {
    /// Iterations performed.
    pub iterations: u64,
    /// Outcome counters summed over every mutation kind.
    pub totals: Counters,
    /// Violations whose evidence was written to the result directory.
    pub persisted: u64,
    /// Mutations still applied at the end.
    pub stack_size: usize,
    /// The final status screen.
    pub snapshot: String,
}

/// A running campaign.
///
/// The session owns the program and the stack of kept mutations, newest last.
/// Every mutation on the stack is still applied, so popping and undoing from
/// the top always finds the state the mutation was applied to.
pub struct Session<R> {
    runner: R,
    ctx: Context,
    program: Program,
    contracts: Vec<Arc<dyn Contract>>,
    stack: Vec<Mutation>,
    telemetry: Arc<StatusScreen>,
    stop: Arc<AtomicBool>,
    iteration: u64,
    iterations: Option<u64>,
    timeout: Duration,
    stack_limit: Option<usize>,
    result_dir: PathBuf,
    report_interval: Duration,
    persisted: u64,
}

impl<R> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("iteration", &self.iteration)
            .field("stack", &self.stack.len())
            .field("units", &self.program.unit_count())
            .finish_non_exhaustive()
    }
}

impl<R: Runner> Session<R> {
    /// The program in its current state.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The mutations currently kept, oldest first.
    pub fn stack(&self) -> &[Mutation] {
        &self.stack
    }

    /// The number of mutations currently kept.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Iterations performed so far.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The telemetry sink. Clone the `Arc` to render it from another thread.
    pub fn telemetry(&self) -> &Arc<StatusScreen> {
        &self.telemetry
    }

    /// A flag that ends [`Session::run`] after the current iteration once
    /// set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Edit the program outside the loop, for example to plant a callee
    /// before the first iteration.
    ///
    /// Edits made here are not kept on the undo stack and are never rolled
    /// back; they must not be undone by hand while mutations applied after
    /// them are still kept.
    pub fn setup<T>(&mut self, f: impl FnOnce(&mut Context, &mut Program) -> T) -> T {
        f(&mut self.ctx, &mut self.program)
    }

    /// Run one iteration with a random mutation.
    pub fn step(&mut self) -> Result<Status> {
        self.step_with(|ctx, program| program.random_mutation(ctx))
    }

    /// Run one iteration with the mutation `propose` applies.
    pub fn step_with(
        &mut self,
        propose: impl FnOnce(&mut Context, &mut Program) -> Result<Mutation, MutationError>,
    ) -> Result<Status> {
        self.iteration += 1;

        let mutation = match propose(&mut self.ctx, &mut self.program) {
            Ok(mutation) => mutation,
            Err(failed) => {
                log::warn!("iteration {}: {failed}", self.iteration);
                failed.undo(&mut self.program);
                self.telemetry.record(failed.kind(), Status::Failed, 0);
                self.rollback_if_needed()?;
                return Ok(Status::Failed);
            }
        };
        let kind = mutation.kind();
        log::info!("iteration {}: {kind}", self.iteration);

        let workdir = self.result_dir.join(format!("{kind}-{}", self.iteration));
        if let Err(e) = fs::create_dir_all(&workdir) {
            return Err(self.fatal(Some(mutation), &workdir, e.into()));
        }

        let checks = match self.program.inject_contracts(&self.contracts, &mutation) {
            Ok(checks) => checks,
            Err(e) => {
                log::warn!("iteration {}: could not instrument {kind}: {e}", self.iteration);
                mutation.undo(&mut self.program)?;
                self.telemetry.record(kind, Status::NotExecuted, 0);
                self.remove_workdir(&workdir)?;
                self.rollback_if_needed()?;
                return Ok(Status::NotExecuted);
            }
        };

        let artifacts = self.program.artifacts();
        let outcome = self.runner.run(&Execution {
            program: &self.program,
            artifacts: &artifacts,
            timeout: self.timeout,
            workdir: &workdir,
        });

        // Evidence is the instrumented program, so save it before the checks
        // are retracted.
        if let Outcome::Violation(evidence) = &outcome {
            let saved = self.program.save_to_dir(&workdir).and_then(|()| {
                fs::write(workdir.join("violation.txt"), evidence).map_err(Error::from)
            });
            if let Err(e) = saved {
                if let Err(undo) = self.program.retract_contracts(checks) {
                    log::error!("failed to retract contracts: {undo}");
                }
                return Err(self.fatal(Some(mutation), &workdir, e));
            }
            self.persisted += 1;
        }
        self.program.retract_contracts(checks)?;

        let status = match outcome {
            Outcome::Normal => {
                self.stack.push(mutation);
                Status::Success
            }
            Outcome::Violation(evidence) => {
                log::info!(
                    "iteration {}: {kind} violates a contract: {evidence}",
                    self.iteration
                );
                self.stack.push(mutation);
                Status::Violates
            }
            Outcome::Interrupted => {
                log::warn!("iteration {}: {kind} interrupted", self.iteration);
                mutation.undo(&mut self.program)?;
                Status::Interrupted
            }
            Outcome::Crashed(cause) => {
                log::warn!("iteration {}: {kind} crashed: {cause}", self.iteration);
                mutation.undo(&mut self.program)?;
                Status::Crashed
            }
        };

        if status != Status::Violates {
            self.remove_workdir(&workdir)?;
        }
        self.telemetry.record(kind, status, 1);
        self.rollback_if_needed()?;
        self.telemetry.set_stack_size(self.stack.len());
        Ok(status)
    }

    /// Roll back a random batch of kept mutations if the campaign stalled or
    /// the stack is full, returning how many were undone.
    ///
    /// A stall undoes between zero and all kept mutations; a full stack
    /// undoes at least one, so the stack never outgrows its limit.
    pub fn rollback_if_needed(&mut self) -> Result<usize> {
        let stalled = self.telemetry.is_stalled();
        let full = self.stack_limit.is_some_and(|limit| self.stack.len() >= limit);
        let len = self.stack.len();
        if len == 0 || !(stalled || full) {
            return Ok(0);
        }
        let count = if full {
            1 + self.ctx.uint_below(len)
        } else {
            self.ctx.uint_below(len + 1)
        };
        log::debug!(
            "rolling back {count} of {len} mutations ({})",
            if full { "stack full" } else { "stalled" }
        );
        self.rollback(count)
    }

    /// Undo the `count` most recently kept mutations, newest first.
    pub fn rollback(&mut self, count: usize) -> Result<usize> {
        let mut undone = 0;
        while undone < count {
            let Some(mutation) = self.stack.pop() else {
                break;
            };
            mutation.undo(&mut self.program)?;
            undone += 1;
        }
        self.telemetry.set_stack_size(self.stack.len());
        Ok(undone)
    }

    /// Iterate until the iteration budget runs out or the stop flag is set,
    /// logging the status screen at the configured interval.
    pub fn run(&mut self) -> Result<Report> {
        while !self.stop.load(Ordering::Relaxed)
            && self.iterations.map_or(true, |n| self.iteration < n)
        {
            self.step()?;
            if self.telemetry.since_last_render() >= self.report_interval {
                log::info!("\n{}", self.telemetry.render_snapshot());
            }
        }
        Ok(self.report())
    }

    /// Summarise the session so far.
    pub fn report(&self) -> Report {
        let snapshot = self.telemetry.render_snapshot();
        Report {
            iterations: self.iteration,
            totals: self.telemetry.totals(),
            persisted: self.persisted,
            stack_size: self.stack.len(),
            snapshot,
        }
    }

    fn remove_workdir(&mut self, workdir: &Path) -> Result<()> {
        match fs::remove_dir_all(workdir) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fatal(None, workdir, e.into())),
        }
    }

    /// Hand back the error that ends the campaign, carrying the program as it
    /// was when staging failed. An in-flight mutation is undone afterwards so
    /// the program stays consistent with the stack.
    fn fatal(&mut self, in_flight: Option<Mutation>, workdir: &Path, error: Error) -> Error {
        let dump = self.program.to_string();
        log::error!(
            "iteration {}: staging {} failed: {error}\n{dump}",
            self.iteration,
            workdir.display(),
        );
        if let Some(mutation) = in_flight {
            if let Err(e) = mutation.undo(&mut self.program) {
                log::error!("failed to undo the in-flight mutation: {e}");
            }
        }
        error.with_postmortem(dump)
    }
}
