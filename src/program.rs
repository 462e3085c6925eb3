//! A program: the ordered set of units a campaign evolves.

use crate::codegen::Artifact;
use crate::contract::{BodyMutation, Contract};
use crate::log;
use crate::mutant::{LocalKind, MethodRef, Mutant, Op, Value};
use crate::mutation::{Granularity, Mutation, MutationError, MutationKind};
use crate::ty::{Type, BUILTIN_CLASSES};
use crate::{Context, Error, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// The default cap on the number of units in a program.
pub const MAX_UNITS: usize = 10;

/// Cumulative probabilities of program-, class-, and method-level mutations.
pub const GRANULARITY_THRESHOLDS: [f64; 3] = [0.01, 0.05, 1.0];

/// Cumulative probabilities of add-field and add-method mutations.
pub const CLASS_THRESHOLDS: [f64; 2] = [0.5, 1.0];

/// Cumulative probabilities of add-local and call-method mutations.
pub const METHOD_THRESHOLDS: [f64; 2] = [0.1, 1.0];

/// A stable handle to a unit of a [`Program`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}

/// A collection of units with at least one "main" unit.
///
/// Every unit is a [`Mutant`] that can evolve; a [`Mutation`] edits exactly
/// one of them (or, at program level, adds one). Unit names are drawn from
/// `base_name` followed by a counter and registered with the [`Context`], so
/// they never collide with each other or with the runtime's own classes.
///
/// # Example
///
/// ```
/// use mutandis::{Context, Program};
///
/// let mut ctx = Context::new(7);
/// let mut program = Program::new("Test", &mut ctx);
/// let before = program.to_string();
///
/// for _ in 0..100 {
///     match program.random_mutation(&mut ctx) {
///         Ok(mutation) => mutation.undo(&mut program).unwrap(),
///         Err(failed) => failed.undo(&mut program),
///     }
///     assert_eq!(program.to_string(), before);
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Program {
    base_name: String,
    units: Vec<(UnitId, Mutant)>,
    next_unit: u32,
    name_counter: u64,
    max_units: usize,
}

impl Program {
    /// Create a program holding one empty main unit.
    pub fn new(base_name: impl Into<String>, ctx: &mut Context) -> Self {
        let mut program = Program {
            base_name: base_name.into(),
            units: Vec::new(),
            next_unit: 0,
            name_counter: 0,
            max_units: MAX_UNITS,
        };
        program.generate_unit(ctx);
        program
    }

    /// Create a program whose main unit is `seed`, for example a unit that
    /// triggered a violation in an earlier campaign.
    ///
    /// Fails if the seed's name is already reserved in `ctx`.
    pub fn from_seed_unit(base_name: impl Into<String>, ctx: &mut Context, seed: Mutant) -> Result<Self> {
        if !ctx.reserve_name(seed.name()) {
            return Err(Error::other(format!(
                "seed unit name {} is already taken",
                seed.name()
            )));
        }
        Ok(Program {
            base_name: base_name.into(),
            units: vec![(UnitId(0), seed)],
            next_unit: 1,
            name_counter: 0,
            max_units: MAX_UNITS,
        })
    }

    /// Set the cap on the number of units; once reached, program-level
    /// mutations degrade to class-level ones.
    pub fn with_max_units(mut self, max_units: usize) -> Self {
        self.max_units = max_units;
        self
    }

    /// The cap on the number of units.
    pub fn max_units(&self) -> usize {
        self.max_units
    }

    /// The prefix of generated unit names.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// How many units the program has. Always at least one.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// The main unit, which is never removed.
    pub fn main(&self) -> UnitId {
        self.units[0].0
    }

    /// Iterate over the units in order.
    pub fn units(&self) -> impl ExactSizeIterator<Item = (UnitId, &Mutant)> + '_ {
        self.units.iter().map(|(id, unit)| (*id, unit))
    }

    /// Look up a unit.
    pub fn unit(&self, id: UnitId) -> Option<&Mutant> {
        self.units.iter().find(|(u, _)| *u == id).map(|(_, unit)| unit)
    }

    /// Look up a unit for editing.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Mutant> {
        self.units
            .iter_mut()
            .find(|(u, _)| *u == id)
            .map(|(_, unit)| unit)
    }

    /// Look up a unit by name.
    pub fn unit_named(&self, name: &str) -> Option<UnitId> {
        self.units
            .iter()
            .find(|(_, unit)| unit.name() == name)
            .map(|(id, _)| *id)
    }

    pub(crate) fn unit_or_err(&self, id: UnitId) -> Result<&Mutant> {
        self.unit(id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in the program")))
    }

    pub(crate) fn unit_mut_or_err(&mut self, id: UnitId) -> Result<&mut Mutant> {
        self.unit_mut(id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in the program")))
    }

    /// Create, register, and append a new empty unit.
    pub fn generate_unit(&mut self, ctx: &mut Context) -> UnitId {
        let name = ctx.fresh_name(&self.base_name, &mut self.name_counter);
        let id = UnitId(self.next_unit);
        self.next_unit += 1;
        log::debug!("generated unit {name}");
        self.units.push((id, Mutant::empty(name)));
        id
    }

    /// Detach a unit.
    ///
    /// Only the undo of the mutation that added the unit may call this: any
    /// other removal could leave calls into the unit dangling. The main unit
    /// cannot be removed. The unit's name stays reserved.
    pub fn remove_unit(&mut self, id: UnitId) -> Result<Mutant> {
        if id == self.main() {
            return Err(Error::other("the main unit is never removed"));
        }
        let pos = self
            .units
            .iter()
            .position(|(u, _)| *u == id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in the program")))?;
        Ok(self.units.remove(pos).1)
    }

    /// A uniformly chosen unit.
    pub fn random_unit(&self, ctx: &mut Context) -> UnitId {
        self.units[ctx.uint_below(self.units.len())].0
    }

    /// A random non-void type: a primitive half of the time, otherwise a
    /// reference to a runtime class or one of this program's units.
    pub fn random_type(&self, ctx: &mut Context) -> Type {
        if ctx.rng().gen_bool() {
            let i = ctx.uint_below(Type::PRIMITIVES.len());
            return Type::PRIMITIVES[i].clone();
        }
        let classes = BUILTIN_CLASSES.len() + self.units.len();
        match ctx.uint_below(classes) {
            i if i < BUILTIN_CLASSES.len() => Type::object(BUILTIN_CLASSES[i]),
            i => Type::object(self.units[i - BUILTIN_CLASSES.len()].1.name()),
        }
    }

    /// Classes that `new` can instantiate: the runtime's, plus every unit
    /// with a constructor.
    pub fn instantiable_classes(&self) -> Vec<String> {
        BUILTIN_CLASSES
            .iter()
            .map(|c| c.to_string())
            .chain(
                self.units
                    .iter()
                    .filter(|(_, unit)| unit.has_constructor())
                    .map(|(_, unit)| unit.name().to_string()),
            )
            .collect()
    }

    /// Every method a call may target: all non-constructor methods of all
    /// units.
    pub fn callees(&self) -> Vec<MethodRef> {
        self.units
            .iter()
            .flat_map(|(_, unit)| {
                unit.methods()
                    .iter()
                    .filter(|m| !m.signature().is_constructor())
                    .filter_map(|m| unit.method_ref(m.id()))
            })
            .collect()
    }

    /// Pick and apply a random mutation.
    ///
    /// A granularity is chosen first (program-level rarely, method-level
    /// almost always), then a target, then a kind. The returned mutation is
    /// already in effect. On failure, nothing was changed, but callers should
    /// still call [`MutationError::undo`] before discarding the error.
    pub fn random_mutation(&mut self, ctx: &mut Context) -> Result<Mutation, MutationError> {
        let granularity = match ctx.bucket(&GRANULARITY_THRESHOLDS) {
            0 if self.units.len() < self.max_units => Granularity::Program,
            0 | 1 => Granularity::Class,
            _ => Granularity::Method,
        };
        match granularity {
            Granularity::Program => Mutation::add_unit(ctx, self),
            Granularity::Class => {
                let unit = self.random_unit(ctx);
                self.random_class_mutation(ctx, unit)
            }
            Granularity::Method => {
                let unit = self.random_unit(ctx);
                self.random_method_mutation(ctx, unit)
            }
        }
    }

    /// Pick and apply a random class-level mutation on `unit`.
    pub fn random_class_mutation(
        &mut self,
        ctx: &mut Context,
        unit: UnitId,
    ) -> Result<Mutation, MutationError> {
        match ctx.bucket(&CLASS_THRESHOLDS) {
            0 => Mutation::add_field(ctx, self, unit),
            _ => Mutation::add_method(ctx, self, unit),
        }
    }

    /// Pick and apply a random method-level mutation on a random method of
    /// `unit`.
    pub fn random_method_mutation(
        &mut self,
        ctx: &mut Context,
        unit: UnitId,
    ) -> Result<Mutation, MutationError> {
        let kind = match ctx.bucket(&METHOD_THRESHOLDS) {
            0 => MutationKind::AddLocal,
            _ => MutationKind::CallMethod,
        };
        let target = self
            .unit_or_err(unit)
            .map_err(|e| MutationError::new(kind, e))?;
        let methods = target.methods().len();
        if methods == 0 {
            return Err(MutationError::new(
                kind,
                Error::no_candidate(format!("{} has no methods", target.name())),
            ));
        }
        let method = target.methods()[ctx.uint_below(methods)].id();
        match kind {
            MutationKind::AddLocal => Mutation::add_local(ctx, self, unit, method),
            _ => Mutation::call_method(ctx, self, unit, method),
        }
    }

    /// Instrument the body `mutation` edited with every contract's check.
    ///
    /// Only method-level mutations are instrumented; for the others this
    /// returns an empty list. If any contract fails, the checks already
    /// inserted are retracted before the error is returned.
    pub fn inject_contracts(
        &mut self,
        contracts: &[Arc<dyn Contract>],
        mutation: &Mutation,
    ) -> Result<Vec<BodyMutation>> {
        let Some((unit, method)) = mutation.body() else {
            return Ok(Vec::new());
        };

        let mut applied = Vec::with_capacity(contracts.len());
        for contract in contracts {
            match contract.apply_check(self, unit, method) {
                Ok(checks) => applied.push(checks),
                Err(e) => {
                    self.retract_contracts(applied)?;
                    return Err(e);
                }
            }
        }
        Ok(applied)
    }

    /// Undo contract checks, last applied first.
    pub fn retract_contracts(&mut self, checks: Vec<BodyMutation>) -> Result<()> {
        for check in checks.into_iter().rev() {
            check.undo(self)?;
        }
        Ok(())
    }

    /// Encode every unit, last unit first so that later units, which only
    /// earlier ones can reference, are loaded before the main unit.
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.units
            .iter()
            .rev()
            .map(|(_, unit)| Artifact::new(unit))
            .collect()
    }

    /// Write `<Unit>.bin` and `<Unit>.txt` for every unit into `dir`.
    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        for (_, unit) in &self.units {
            let artifact = Artifact::new(unit);
            fs::write(dir.join(format!("{}.bin", artifact.name)), &artifact.bytes)?;
            fs::write(dir.join(format!("{}.txt", artifact.name)), unit.to_string())?;
        }
        Ok(())
    }

    /// Check that the program can be handed to code generation: no
    /// instruction refers to a missing local, method, or class; argument
    /// and result types line up; and no variable is read before it is
    /// assigned.
    pub fn check_references(&self) -> Result<()> {
        let known_class = |name: &str| {
            BUILTIN_CLASSES.contains(&name) || self.unit_named(name).is_some()
        };
        let known_type = |ty: &Type| ty.class_name().map_or(true, known_class);
        let bad = |unit: &Mutant, what: String| -> Result<()> {
            Err(Error::other(format!("{}: {what}", unit.name())))
        };

        for (_, unit) in &self.units {
            for field in unit.fields() {
                if !known_type(&field.ty) {
                    return bad(unit, format!("field {} has unknown type {}", field.name, field.ty));
                }
            }
            for method in unit.methods() {
                let sig = method.signature();
                if !known_type(&sig.ret) || !sig.params.iter().all(known_type) {
                    return bad(unit, format!("{sig} mentions an unknown class"));
                }
                let body = method.body();
                for local in body.locals() {
                    if !known_type(local.ty()) {
                        return bad(unit, format!("local {} has unknown type", local.name()));
                    }
                }

                for (pos, instr) in body.instrs().iter().enumerate() {
                    let ty_of = |l| body.local(l).map(|l| l.ty());
                    let readable = |l| body.live_from(l).is_some_and(|from| from <= pos);
                    let op = instr.op();
                    if op.locals().iter().any(|l| body.local(*l).is_none()) {
                        return bad(unit, format!("{sig}: {} uses a missing local", instr.id()));
                    }
                    let ok = match op {
                        Op::Assign { dst, value } => match value {
                            Value::New(class) => {
                                self.instantiable_classes().contains(class)
                                    && ty_of(*dst).is_some_and(|t| {
                                        t.is_assignable_from(&Type::object(class.as_str()))
                                    })
                            }
                            Value::Null => ty_of(*dst).is_some_and(Type::is_reference),
                            Value::Const(c) => ty_of(*dst) == Some(&c.ty()),
                        },
                        Op::Invoke(call) => {
                            let target = self
                                .unit_named(&call.callee.class)
                                .and_then(|u| self.unit(u))
                                .and_then(|u| u.method_named(&call.callee.sig.name));
                            let params = &call.callee.sig.params;
                            target.is_some_and(|m| *m.signature() == call.callee.sig)
                                && call.receiver.map_or(true, |r| {
                                    readable(r)
                                        && ty_of(r) == Some(&Type::object(call.callee.class.as_str()))
                                })
                                && call.args.len() == params.len()
                                && call.args.iter().zip(params).all(|(a, p)| {
                                    readable(*a) && ty_of(*a).is_some_and(|t| p.is_assignable_from(t))
                                })
                                && call.dst.map_or(true, |d| {
                                    body.local(d).is_some_and(|l| {
                                        l.kind() == LocalKind::Var
                                            && l.ty().is_assignable_from(&call.callee.sig.ret)
                                    })
                                })
                        }
                        Op::CheckType { local, .. } => readable(*local),
                        Op::Return(local) => {
                            pos + 1 == body.instrs().len()
                                && match local {
                                    Some(l) => readable(*l) && ty_of(*l) == Some(&sig.ret),
                                    None => sig.ret == Type::Void,
                                }
                        }
                    };
                    if !ok {
                        return bad(unit, format!("{sig}: {} is ill-formed", instr.id()));
                    }
                }
            }
        }
        Ok(())
    }
}

/// The structural dump of every unit, in order.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, unit) in &self.units {
            write!(f, "{unit}")?;
        }
        Ok(())
    }
}
