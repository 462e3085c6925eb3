//! Reversible structural edits.
//!
//! A [`Mutation`] is constructed by applying it: the constructors below edit
//! the [`Program`] and return a record holding exactly the handles needed to
//! reverse the edit with [`Mutation::undo`]. A constructor that fails reverts
//! whatever it had already done before returning its [`MutationError`].

use crate::log;
use crate::mutant::{Call, Constant, FieldId, InstrId, LocalId, LocalKind, MethodId, Op, Signature, Value};
use crate::program::{Program, UnitId};
use crate::ty::Type;
use crate::{Context, Error, Result};
use std::fmt;

/// The level of the program structure a mutation edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    /// Adds or removes units.
    Program,
    /// Adds members to one unit.
    Class,
    /// Edits one method body.
    Method,
}

/// Identifies the concrete kind of a mutation, for telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationKind {
    /// Append a new empty unit.
    AddUnit,
    /// Add a field to a unit.
    AddField,
    /// Add a method with an empty body to a unit.
    AddMethod,
    /// Add an initialised local to a body.
    AddLocal,
    /// Insert a call to a visible method into a body.
    CallMethod,
}

impl MutationKind {
    /// Every kind, in table order.
    pub const ALL: [MutationKind; 5] = [
        MutationKind::AddUnit,
        MutationKind::AddField,
        MutationKind::AddMethod,
        MutationKind::AddLocal,
        MutationKind::CallMethod,
    ];

    /// The granularity this kind of mutation operates at.
    pub fn granularity(self) -> Granularity {
        match self {
            MutationKind::AddUnit => Granularity::Program,
            MutationKind::AddField | MutationKind::AddMethod => Granularity::Class,
            MutationKind::AddLocal | MutationKind::CallMethod => Granularity::Method,
        }
    }

    /// A short name, used in status tables and working-directory names.
    pub fn name(self) -> &'static str {
        match self {
            MutationKind::AddUnit => "AddUnit",
            MutationKind::AddField => "AddField",
            MutationKind::AddMethod => "AddMethod",
            MutationKind::AddLocal => "AddLocal",
            MutationKind::CallMethod => "CallMethod",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A mutation that is currently applied to a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    /// A unit was appended.
    AddUnit {
        /// The new unit.
        unit: UnitId,
    },
    /// A field was added.
    AddField {
        /// The edited unit.
        unit: UnitId,
        /// The new field.
        field: FieldId,
    },
    /// A method was added.
    AddMethod {
        /// The edited unit.
        unit: UnitId,
        /// The new method.
        method: MethodId,
    },
    /// A local was added together with its initialising assignment.
    AddLocal {
        /// The edited unit.
        unit: UnitId,
        /// The edited method.
        method: MethodId,
        /// The new local.
        local: LocalId,
        /// The assignment initialising it.
        init: InstrId,
    },
    /// A call was inserted.
    CallMethod {
        /// The edited unit.
        unit: UnitId,
        /// The edited method.
        method: MethodId,
        /// The inserted call.
        call: InstrId,
    },
}

impl Mutation {
    /// Append a new empty unit to `program`.
    pub fn add_unit(ctx: &mut Context, program: &mut Program) -> Result<Mutation, MutationError> {
        if program.unit_count() >= program.max_units() {
            return Err(MutationError::new(
                MutationKind::AddUnit,
                Error::no_candidate(format!(
                    "program already has {} units",
                    program.unit_count()
                )),
            ));
        }
        let unit = program.generate_unit(ctx);
        Ok(Mutation::AddUnit { unit })
    }

    /// Add a field of a random type to `unit`.
    pub fn add_field(
        ctx: &mut Context,
        program: &mut Program,
        unit: UnitId,
    ) -> Result<Mutation, MutationError> {
        let fail = |e| MutationError::new(MutationKind::AddField, e);
        let ty = program.random_type(ctx);
        let is_static = ctx.rng().gen_bool();
        let target = program.unit_mut(unit).ok_or_else(|| fail(unknown_unit(unit)))?;
        let name = target.fresh_member_name("f");
        let field = target.add_field(name, ty, is_static).map_err(fail)?;
        Ok(Mutation::AddField { unit, field })
    }

    /// Add a method with a random signature and an empty body to `unit`.
    pub fn add_method(
        ctx: &mut Context,
        program: &mut Program,
        unit: UnitId,
    ) -> Result<Mutation, MutationError> {
        let fail = |e| MutationError::new(MutationKind::AddMethod, e);
        let params = (0..ctx.uint_below(3))
            .map(|_| program.random_type(ctx))
            .collect();
        let ret = if ctx.bucket(&[0.25, 1.0]) == 0 {
            Type::Void
        } else {
            program.random_type(ctx)
        };
        let is_static = ctx.rng().gen_bool();

        let target = program.unit_mut(unit).ok_or_else(|| fail(unknown_unit(unit)))?;
        let sig = Signature::new(target.fresh_member_name("m"), params, ret).with_static(is_static);
        let method = target.add_method(sig).map_err(fail)?;
        Ok(Mutation::AddMethod { unit, method })
    }

    /// Add a local of a random type to a body, assigned at the top of the
    /// body.
    pub fn add_local(
        ctx: &mut Context,
        program: &mut Program,
        unit: UnitId,
        method: MethodId,
    ) -> Result<Mutation, MutationError> {
        let fail = |e| MutationError::new(MutationKind::AddLocal, e);
        let ty = program.random_type(ctx);
        let value = random_value(ctx, program, &ty);

        let target = program.unit_mut(unit).ok_or_else(|| fail(unknown_unit(unit)))?;
        let local = target.add_local(method, ty).map_err(fail)?;
        let assign = Op::Assign { dst: local, value };
        let init = match target.insert_instr(method, 0, assign) {
            Ok(init) => init,
            Err(e) => {
                if let Err(undo) = target.remove_local(method, local) {
                    log::error!("failed to revert partial AddLocal: {undo}");
                }
                return Err(fail(e));
            }
        };
        Ok(Mutation::AddLocal {
            unit,
            method,
            local,
            init,
        })
    }

    /// Insert, somewhere in a body, a call to a method of any unit whose
    /// receiver and arguments can be supplied by locals that already hold a
    /// value at that point.
    pub fn call_method(
        ctx: &mut Context,
        program: &mut Program,
        unit: UnitId,
        method: MethodId,
    ) -> Result<Mutation, MutationError> {
        let fail = |e| MutationError::new(MutationKind::CallMethod, e);
        let (position, call) = plan_call(ctx, program, unit, method).map_err(fail)?;

        let target = program.unit_mut(unit).ok_or_else(|| fail(unknown_unit(unit)))?;
        let call = target.insert_call(method, position, call).map_err(fail)?;
        Ok(Mutation::CallMethod { unit, method, call })
    }

    /// The concrete kind of this mutation.
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::AddUnit { .. } => MutationKind::AddUnit,
            Mutation::AddField { .. } => MutationKind::AddField,
            Mutation::AddMethod { .. } => MutationKind::AddMethod,
            Mutation::AddLocal { .. } => MutationKind::AddLocal,
            Mutation::CallMethod { .. } => MutationKind::CallMethod,
        }
    }

    /// The granularity of this mutation.
    pub fn granularity(&self) -> Granularity {
        self.kind().granularity()
    }

    /// The body this mutation edited, for method-level mutations.
    pub fn body(&self) -> Option<(UnitId, MethodId)> {
        match *self {
            Mutation::AddLocal { unit, method, .. } | Mutation::CallMethod { unit, method, .. } => {
                Some((unit, method))
            }
            Mutation::AddUnit { .. } | Mutation::AddField { .. } | Mutation::AddMethod { .. } => {
                None
            }
        }
    }

    /// Reverse this mutation.
    ///
    /// Mutations must be undone in the reverse order they were applied in:
    /// a later mutation may depend on what an earlier one added.
    pub fn undo(self, program: &mut Program) -> Result<()> {
        log::trace!("undoing {self:?}");
        match self {
            Mutation::AddUnit { unit } => {
                program.remove_unit(unit)?;
            }
            Mutation::AddField { unit, field } => {
                program.unit_mut_or_err(unit)?.remove_field(field)?;
            }
            Mutation::AddMethod { unit, method } => {
                program.unit_mut_or_err(unit)?.remove_method(method)?;
            }
            Mutation::AddLocal {
                unit,
                method,
                local,
                init,
            } => {
                let target = program.unit_mut_or_err(unit)?;
                target.remove_instr(method, init)?;
                target.remove_local(method, local)?;
            }
            Mutation::CallMethod { unit, method, call } => {
                program.unit_mut_or_err(unit)?.remove_instr(method, call)?;
            }
        }
        Ok(())
    }
}

fn unknown_unit(unit: UnitId) -> Error {
    Error::invalid_handle(format!("{unit} is not in the program"))
}

fn random_value(ctx: &mut Context, program: &Program, ty: &Type) -> Value {
    match ty {
        Type::Bool => Value::Const(Constant::Bool(ctx.rng().gen_bool())),
        Type::Int => Value::Const(Constant::Int(ctx.rng().gen_i32())),
        Type::Long => Value::Const(Constant::Long(ctx.rng().gen_i64())),
        Type::Double => Value::Const(Constant::Double(f64::from(ctx.rng().gen_i32()) / 16.0)),
        Type::Void => Value::Null,
        Type::Object(_) => {
            // Any instantiable class fits `Object`; other types need their
            // exact class.
            let candidates: Vec<String> = program
                .instantiable_classes()
                .into_iter()
                .filter(|c| ty.is_assignable_from(&Type::object(c.as_str())))
                .collect();
            match ctx.rng().choose(candidates) {
                Some(c) if ctx.bucket(&[0.9, 1.0]) == 0 => Value::New(c),
                _ => Value::Null,
            }
        }
    }
}

/// Pick a callee plus the locals to feed it, and a position where all of
/// those locals already hold values.
fn plan_call(
    ctx: &mut Context,
    program: &Program,
    unit: UnitId,
    method: MethodId,
) -> Result<(usize, Call)> {
    let caller_unit = program.unit_or_err(unit)?;
    let caller = caller_unit
        .method(method)
        .ok_or_else(|| Error::invalid_handle(format!("{method} is not in {unit}")))?;
    let body = caller.body();

    // Locals that hold a value somewhere before the trailing return.
    let live: Vec<(LocalId, &Type, usize)> = body
        .locals()
        .iter()
        .filter_map(|l| Some((l.id(), l.ty(), body.live_from(l.id())?)))
        .collect();
    let suppliers = |want: &Type| -> Vec<(LocalId, usize)> {
        live.iter()
            .filter(|(_, ty, _)| want.is_assignable_from(ty))
            .map(|(id, _, from)| (*id, *from))
            .collect()
    };

    let mut feasible = Vec::new();
    for callee in program.callees() {
        if callee.class == caller_unit.name() && callee.sig.name == caller.name() {
            continue;
        }
        let receivers = if callee.sig.is_static {
            None
        } else {
            let own = Type::object(callee.class.as_str());
            let rs: Vec<_> = live
                .iter()
                .filter(|(_, ty, _)| **ty == own)
                .map(|(id, _, from)| (*id, *from))
                .collect();
            if rs.is_empty() {
                continue;
            }
            Some(rs)
        };
        let args: Vec<_> = callee.sig.params.iter().map(|p| suppliers(p)).collect();
        if args.iter().any(|a| a.is_empty()) {
            continue;
        }
        feasible.push((callee, receivers, args));
    }

    let (callee, receivers, args) = ctx.rng().choose(feasible).ok_or_else(|| {
        Error::no_candidate(format!(
            "no method with a compatible signature is callable from {}.{}",
            caller_unit.name(),
            caller.name()
        ))
    })?;

    let mut earliest = 0;
    let mut pick = |ctx: &mut Context, options: Vec<(LocalId, usize)>| -> Option<LocalId> {
        let (id, from) = ctx.rng().choose(options)?;
        earliest = earliest.max(from);
        Some(id)
    };
    let receiver = match receivers {
        Some(rs) => pick(ctx, rs),
        None => None,
    };
    let args: Vec<LocalId> = args.into_iter().filter_map(|a| pick(ctx, a)).collect();

    let dst = if callee.sig.ret == Type::Void || ctx.rng().gen_bool() {
        None
    } else {
        let sinks: Vec<LocalId> = body
            .locals()
            .iter()
            .filter(|l| l.kind() == LocalKind::Var && l.ty().is_assignable_from(&callee.sig.ret))
            .map(|l| l.id())
            .collect();
        ctx.rng().choose(sinks)
    };

    let end = body.insertion_end();
    let position = earliest + ctx.uint_below(end - earliest + 1);
    Ok((
        position,
        Call {
            callee,
            receiver,
            args,
            dst,
        },
    ))
}

/// A mutation that could not be constructed.
///
/// Carries the kind that was attempted, so the failure can still be counted,
/// and the reason.
pub struct MutationError {
    kind: MutationKind,
    error: Error,
}

impl MutationError {
    /// A failed attempt at a `kind` mutation.
    pub fn new(kind: MutationKind, error: Error) -> Self {
        MutationError { kind, error }
    }

    /// The kind of mutation that was attempted.
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Why it failed.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Discard the kind, keeping the underlying error.
    pub fn into_error(self) -> Error {
        self.error
    }

    /// Undo whatever the failed attempt applied.
    ///
    /// Constructors revert their partial edits before reporting failure, so
    /// this leaves `program` untouched.
    pub fn undo(&self, _program: &mut Program) {
        log::trace!("{} attempt was already reverted", self.kind);
    }
}

impl fmt::Display for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mutation failed: {}", self.kind, self.error)
    }
}

impl fmt::Debug for MutationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for MutationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<MutationError> for Error {
    fn from(e: MutationError) -> Self {
        e.into_error()
    }
}
