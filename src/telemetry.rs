//! Outcome accounting and the status screen.

use crate::mutation::MutationKind;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// What happened to one proposed mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Executed normally and kept.
    Success,
    /// Could not be constructed.
    Failed,
    /// Constructed but never executed.
    NotExecuted,
    /// Execution ended abnormally; the mutation was undone.
    Crashed,
    /// Execution timed out or was interrupted; the mutation was undone.
    Interrupted,
    /// An injected contract check fired.
    Violates,
}

/// Where the campaign reports outcomes.
///
/// Methods take `&self`: a sink may be read by a reporting thread while the
/// campaign records into it.
pub trait Telemetry {
    /// Count one proposed mutation of `kind` and how it ended, along with the
    /// number of executions it took.
    fn record(&self, kind: MutationKind, status: Status, executions: u64);

    /// Whether the last observation window saw no accepted mutation.
    /// Reading clears the flag.
    fn is_stalled(&self) -> bool;

    /// Publish the current size of the undo stack.
    fn set_stack_size(&self, size: usize);

    /// Render the current counters as text.
    fn render_snapshot(&self) -> String;
}

/// Per-kind outcome counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Executed normally and kept.
    pub success: u64,
    /// Failed or not executed.
    pub failed: u64,
    /// Crashed or interrupted.
    pub crashed: u64,
    /// Contract violations.
    pub violations: u64,
}

#[derive(Debug)]
struct State {
    kinds: Vec<(MutationKind, Counters)>,
    total_mutations: u64,
    total_executions: u64,
    since_render: (u64, u64),
    window_len: u64,
    window_accepted: u64,
    stalled: bool,
    stalled_shown: bool,
    stack_size: usize,
    started: Instant,
    last_render: Instant,
}

/// The default [`Telemetry`] sink: counters per mutation kind plus stall
/// detection over fixed windows of recorded mutations.
///
/// # Example
///
/// ```
/// use mutandis::{MutationKind, Status, StatusScreen, Telemetry};
///
/// let screen = StatusScreen::new(2);
/// screen.record(MutationKind::CallMethod, Status::Crashed, 1);
/// screen.record(MutationKind::AddLocal, Status::Failed, 0);
///
/// // Two records, zero accepted: the window stalled.
/// assert!(screen.is_stalled());
/// assert!(!screen.is_stalled());
/// assert_eq!(screen.counters(MutationKind::CallMethod).crashed, 1);
/// ```
#[derive(Debug)]
pub struct StatusScreen {
    window: u64,
    state: Mutex<State>,
}

impl StatusScreen {
    /// A sink that declares a stall when `window` consecutive records contain
    /// no accepted mutation.
    ///
    /// # Panics
    ///
    /// Panics if `window` is zero.
    pub fn new(window: u64) -> Self {
        assert!(window > 0, "stall window must not be empty");
        let now = Instant::now();
        StatusScreen {
            window,
            state: Mutex::new(State {
                kinds: Vec::new(),
                total_mutations: 0,
                total_executions: 0,
                since_render: (0, 0),
                window_len: 0,
                window_accepted: 0,
                stalled: false,
                stalled_shown: false,
                stack_size: 0,
                started: now,
                last_render: now,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The counters for `kind`.
    pub fn counters(&self, kind: MutationKind) -> Counters {
        self.state()
            .kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or_else(Counters::default, |(_, c)| *c)
    }

    /// The counters summed over every kind.
    pub fn totals(&self) -> Counters {
        self.state()
            .kinds
            .iter()
            .fold(Counters::default(), |acc, (_, c)| Counters {
                success: acc.success + c.success,
                failed: acc.failed + c.failed,
                crashed: acc.crashed + c.crashed,
                violations: acc.violations + c.violations,
            })
    }

    /// The total number of executions recorded.
    pub fn executions(&self) -> u64 {
        let state = self.state();
        state.total_executions + state.since_render.1
    }

    /// The stack size last published.
    pub fn stack_size(&self) -> usize {
        self.state().stack_size
    }

    /// Time since the last rendering.
    pub fn since_last_render(&self) -> Duration {
        self.state().last_render.elapsed()
    }
}

impl Telemetry for StatusScreen {
    fn record(&self, kind: MutationKind, status: Status, executions: u64) {
        let mut state = self.state();
        let index = match state.kinds.iter().position(|(k, _)| *k == kind) {
            Some(i) => i,
            None => {
                state.kinds.push((kind, Counters::default()));
                state.kinds.len() - 1
            }
        };

        state.since_render.0 += 1;
        state.since_render.1 += executions;

        let counters = &mut state.kinds[index].1;
        match status {
            Status::Success => counters.success += 1,
            Status::Failed | Status::NotExecuted => counters.failed += 1,
            Status::Crashed | Status::Interrupted => counters.crashed += 1,
            Status::Violates => counters.violations += 1,
        }
        if status == Status::Success {
            state.stack_size += 1;
            state.window_accepted += 1;
        }

        state.window_len += 1;
        if state.window_len >= self.window {
            if state.window_accepted == 0 {
                state.stalled = true;
                state.stalled_shown = true;
            }
            state.window_len = 0;
            state.window_accepted = 0;
        }
    }

    fn is_stalled(&self) -> bool {
        std::mem::take(&mut self.state().stalled)
    }

    fn set_stack_size(&self, size: usize) {
        self.state().stack_size = size;
    }

    fn render_snapshot(&self) -> String {
        let mut state = self.state();
        let (mutations, executions) = std::mem::take(&mut state.since_render);
        state.total_mutations += mutations;
        state.total_executions += executions;

        let now = Instant::now();
        let interval = now.duration_since(state.last_render).as_secs_f64().max(1e-3);
        state.last_render = now;
        let secs = state.started.elapsed().as_secs();
        let stalled = std::mem::take(&mut state.stalled_shown);

        let mut out = String::new();
        let _ = writeln!(out, "mutandis\n");
        let _ = writeln!(
            out,
            "            {:4}:{:02}:{:02} |",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        );
        let _ = writeln!(
            out,
            "{:10} total execs | {:10} total mutations",
            state.total_executions, state.total_mutations
        );
        let _ = writeln!(
            out,
            "{:10}     execs/s | {:10}     mutations/s",
            (executions as f64 / interval).round() as u64,
            (mutations as f64 / interval).round() as u64
        );
        let _ = writeln!(
            out,
            "               {:>7} | {:10}    stacked muts\n",
            if stalled { "STALLED" } else { "" },
            state.stack_size
        );
        let _ = writeln!(
            out,
            "       Mutation type |    Success |      Fails |    Crashed | Violations |"
        );
        for (kind, c) in &state.kinds {
            let _ = writeln!(
                out,
                "{:>20} | {:10} | {:10} | {:10} | {:10} |",
                kind.name(),
                c.success,
                c.failed,
                c.crashed,
                c.violations
            );
        }
        out
    }
}
