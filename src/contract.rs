//! Runtime checks injected into method bodies.
//!
//! A [`Contract`] describes a class of defect to detect. Applying it to a
//! body inserts check instructions and yields a [`BodyMutation`] that records
//! exactly those instructions, so they can be retracted before the next
//! structural mutation round.

use crate::log;
use crate::mutant::{InstrId, LocalId, MethodId, Mutant, Op};
use crate::program::{Program, UnitId};
use crate::ty::{Type, OBJECT};
use crate::{Error, Result};
use std::fmt;

/// A pluggable runtime check.
pub trait Contract: fmt::Debug {
    /// A short name for logs.
    fn name(&self) -> &'static str;

    /// Insert this contract's checks into the body of `method` in `unit`.
    ///
    /// On failure, the body must be left unchanged.
    fn apply_check(&self, program: &mut Program, unit: UnitId, method: MethodId) -> Result<BodyMutation>;
}

/// The reversible record of one contract's checks in one body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyMutation {
    contract: &'static str,
    unit: UnitId,
    method: MethodId,
    instrs: Vec<InstrId>,
}

impl BodyMutation {
    /// An empty record for checks that `contract` is about to insert.
    pub fn new(contract: &'static str, unit: UnitId, method: MethodId) -> Self {
        BodyMutation {
            contract,
            unit,
            method,
            instrs: Vec::new(),
        }
    }

    /// Record an inserted check instruction.
    pub fn push(&mut self, instr: InstrId) {
        self.instrs.push(instr);
    }

    /// The contract that inserted these checks.
    pub fn contract(&self) -> &'static str {
        self.contract
    }

    /// The instrumented body.
    pub fn body(&self) -> (UnitId, MethodId) {
        (self.unit, self.method)
    }

    /// The inserted check instructions, in insertion order.
    pub fn instrs(&self) -> &[InstrId] {
        &self.instrs
    }

    /// Remove every recorded check, newest first.
    pub fn undo(self, program: &mut Program) -> Result<()> {
        let target = program
            .unit_mut(self.unit)
            .ok_or_else(|| Error::invalid_handle(format!("{} is not in the program", self.unit)))?;
        self.undo_in(target)
    }

    fn undo_in(&self, target: &mut Mutant) -> Result<()> {
        for instr in self.instrs.iter().rev() {
            target.remove_instr(self.method, *instr)?;
        }
        Ok(())
    }
}

/// Detects type confusion: at the end of the body, every reference local must
/// still hold an instance of its declared class.
///
/// Locals declared as `Object` are skipped since everything is an `Object`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeConfusion;

impl Contract for TypeConfusion {
    fn name(&self) -> &'static str {
        "TypeConfusion"
    }

    fn apply_check(&self, program: &mut Program, unit: UnitId, method: MethodId) -> Result<BodyMutation> {
        let target = program
            .unit_mut(unit)
            .ok_or_else(|| Error::invalid_handle(format!("{unit} is not in the program")))?;
        let body = target
            .method(method)
            .ok_or_else(|| Error::invalid_handle(format!("{method} is not in {unit}")))?
            .body();

        let end = body.insertion_end();
        let checked: Vec<(LocalId, Type)> = body
            .locals()
            .iter()
            .filter(|l| l.ty().class_name().is_some_and(|c| c != OBJECT))
            .filter(|l| body.live_from(l.id()).is_some_and(|from| from <= end))
            .map(|l| (l.id(), l.ty().clone()))
            .collect();

        let mut checks = BodyMutation::new(self.name(), unit, method);
        for (i, (local, expected)) in checked.into_iter().enumerate() {
            // Each check lands right before the return, after the previous one.
            let op = Op::CheckType { local, expected };
            match target.insert_instr(method, end + i, op) {
                Ok(id) => checks.push(id),
                Err(e) => {
                    checks.undo_in(target)?;
                    return Err(e);
                }
            }
        }
        log::trace!("{} inserted {} checks", self.name(), checks.instrs.len());
        Ok(checks)
    }
}
