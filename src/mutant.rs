//! The structural model of one class under evolution.
//!
//! A [`Mutant`] owns its fields and methods, and every method owns a [`Body`]:
//! a local-variable table plus an instruction sequence that always ends in a
//! single `return`. Members are addressed through stable handles
//! ([`FieldId`], [`MethodId`], [`LocalId`], [`InstrId`]) that are never
//! reused, so undoing an edit resolves the right element no matter how the
//! surrounding vectors were shifted in the meantime.
//!
//! Every `add_*` / `insert_*` operation validates first and edits second: when
//! it fails, the unit is left exactly as it was.

use crate::ty::{Type, OBJECT};
use crate::{Error, Result};
use std::fmt;

/// The name of the method that constructs instances of a unit.
pub const CONSTRUCTOR: &str = "<init>";

macro_rules! handles {
    ( $( $(#[$attr:meta])* $name:ident ; )* ) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}({})", stringify!($name), self.0)
                }
            }
        )*
    };
}

handles! {
    /// A stable handle to a field of a [`Mutant`].
    FieldId;
    /// A stable handle to a method of a [`Mutant`].
    MethodId;
    /// A stable handle to a local variable of a method [`Body`].
    LocalId;
    /// A stable handle to an instruction of a method [`Body`].
    InstrId;
}

/// A field declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    id: FieldId,
    /// The field's name, unique within its unit.
    pub name: String,
    /// The field's type; never [`Type::Void`].
    pub ty: Type,
    /// Whether the field belongs to the class rather than its instances.
    pub is_static: bool,
}

impl Field {
    /// This field's handle.
    pub fn id(&self) -> FieldId {
        self.id
    }
}

/// A method's name and type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    /// The method's name, unique within its unit.
    pub name: String,
    /// Parameter types, in order.
    pub params: Vec<Type>,
    /// The return type.
    pub ret: Type,
    /// Whether the method is called without a receiver.
    pub is_static: bool,
}

impl Signature {
    /// An instance method signature.
    pub fn new(name: impl Into<String>, params: Vec<Type>, ret: Type) -> Self {
        Signature {
            name: name.into(),
            params,
            ret,
            is_static: false,
        }
    }

    /// The signature of the implicit default constructor.
    pub fn constructor() -> Self {
        Signature::new(CONSTRUCTOR, vec![], Type::Void)
    }

    /// Set whether this is a static method.
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Whether this is the signature of a constructor.
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            f.write_str("static ")?;
        }
        write!(f, "{} {}(", self.ret, self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        f.write_str(")")
    }
}

/// A reference to a method of some unit, as it appears in a call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// The unit declaring the method.
    pub class: String,
    /// The method's signature.
    pub sig: Signature,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {}>", self.class, self.sig)
    }
}

/// What a local variable slot holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalKind {
    /// The receiver of an instance method.
    This,
    /// A method parameter.
    Param,
    /// A variable introduced inside the body.
    Var,
}

/// A local variable slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Local {
    id: LocalId,
    name: String,
    ty: Type,
    kind: LocalKind,
}

impl Local {
    /// This local's handle.
    pub fn id(&self) -> LocalId {
        self.id
    }

    /// This local's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This local's declared type.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// What this slot holds.
    pub fn kind(&self) -> LocalKind {
        self.kind
    }
}

/// A constant operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    /// A boolean constant.
    Bool(bool),
    /// An `int` constant.
    Int(i32),
    /// A `long` constant.
    Long(i64),
    /// A `double` constant.
    Double(f64),
}

impl Constant {
    /// The type of this constant.
    pub fn ty(&self) -> Type {
        match self {
            Constant::Bool(_) => Type::Bool,
            Constant::Int(_) => Type::Int,
            Constant::Long(_) => Type::Long,
            Constant::Double(_) => Type::Double,
        }
    }
}

/// The right-hand side of an assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A constant.
    Const(Constant),
    /// The null reference.
    Null,
    /// A fresh instance of the named class, built by its constructor.
    New(String),
}

impl Value {
    /// The zero value of `ty`: `false`, `0`, `0.0`, or `null`.
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Const(Constant::Bool(false)),
            Type::Int => Value::Const(Constant::Int(0)),
            Type::Long => Value::Const(Constant::Long(0)),
            Type::Double => Value::Const(Constant::Double(0.0)),
            Type::Object(_) | Type::Void => Value::Null,
        }
    }

    fn fits(&self, ty: &Type) -> bool {
        match self {
            Value::Const(c) => c.ty() == *ty,
            Value::Null => ty.is_reference(),
            Value::New(class) => ty.is_assignable_from(&Type::object(class.as_str())),
        }
    }
}

/// A method invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// The invoked method.
    pub callee: MethodRef,
    /// The receiver; `None` for static callees.
    pub receiver: Option<LocalId>,
    /// One argument per callee parameter.
    pub args: Vec<LocalId>,
    /// Where the result is stored, if anywhere.
    pub dst: Option<LocalId>,
}

/// One instruction of a method body.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// `dst = value`.
    Assign {
        /// The assigned local.
        dst: LocalId,
        /// The assigned value.
        value: Value,
    },
    /// A method call.
    Invoke(Call),
    /// Raise a contract violation unless `local` refers to an instance of
    /// exactly `expected` (or is null).
    CheckType {
        /// The checked local.
        local: LocalId,
        /// The type the local was declared with.
        expected: Type,
    },
    /// Leave the method, optionally returning a local.
    Return(Option<LocalId>),
}

impl Op {
    /// Every local this instruction reads or writes.
    pub fn locals(&self) -> Vec<LocalId> {
        match self {
            Op::Assign { dst, .. } => vec![*dst],
            Op::Invoke(call) => call
                .receiver
                .iter()
                .chain(call.args.iter())
                .chain(call.dst.iter())
                .copied()
                .collect(),
            Op::CheckType { local, .. } => vec![*local],
            Op::Return(local) => local.iter().copied().collect(),
        }
    }
}

/// An instruction together with its handle.
#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    id: InstrId,
    op: Op,
}

impl Instr {
    /// This instruction's handle.
    pub fn id(&self) -> InstrId {
        self.id
    }

    /// The operation this instruction performs.
    pub fn op(&self) -> &Op {
        &self.op
    }
}

/// A method body: local table plus instructions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Body {
    locals: Vec<Local>,
    instrs: Vec<Instr>,
}

impl Body {
    /// The local-variable table, in declaration order.
    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    /// The instructions, in execution order.
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Look up a local by handle.
    pub fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.iter().find(|l| l.id == id)
    }

    /// The current position of an instruction.
    pub fn position(&self, id: InstrId) -> Option<usize> {
        self.instrs.iter().position(|i| i.id == id)
    }

    /// One past the last position where an instruction may be inserted:
    /// everything goes before the trailing `return`.
    pub fn insertion_end(&self) -> usize {
        match self.instrs.last() {
            Some(Instr {
                op: Op::Return(_), ..
            }) => self.instrs.len() - 1,
            _ => self.instrs.len(),
        }
    }

    /// The earliest position at which `local` holds a value, or `None` if the
    /// local is never assigned.
    ///
    /// Receivers and parameters are live from the start; variables become
    /// live right after their first assignment.
    pub fn live_from(&self, local: LocalId) -> Option<usize> {
        match self.local(local)?.kind {
            LocalKind::This | LocalKind::Param => Some(0),
            LocalKind::Var => self
                .instrs
                .iter()
                .position(|i| matches!(i.op, Op::Assign { dst, .. } if dst == local))
                .map(|p| p + 1),
        }
    }

    fn is_referenced(&self, local: LocalId) -> bool {
        self.instrs.iter().any(|i| i.op.locals().contains(&local))
    }

    fn local_name(&self, id: LocalId) -> &str {
        self.local(id).map_or("<dangling>", |l| l.name.as_str())
    }

    fn check_locals(&self, op: &Op) -> Result<()> {
        match op.locals().into_iter().find(|l| self.local(*l).is_none()) {
            Some(l) => Err(Error::invalid_handle(format!("{l} is not in this body"))),
            None => Ok(()),
        }
    }

    fn fmt_op(&self, op: &Op, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match op {
            Op::Assign { dst, value } => {
                write!(f, "{} = ", self.local_name(*dst))?;
                match value {
                    Value::Const(Constant::Bool(b)) => write!(f, "{b}"),
                    Value::Const(Constant::Int(i)) => write!(f, "{i}"),
                    Value::Const(Constant::Long(l)) => write!(f, "{l}L"),
                    Value::Const(Constant::Double(d)) => write!(f, "{d:?}"),
                    Value::Null => f.write_str("null"),
                    Value::New(class) => write!(f, "new {class}()"),
                }
            }
            Op::Invoke(call) => {
                if let Some(dst) = call.dst {
                    write!(f, "{} = ", self.local_name(dst))?;
                }
                match call.receiver {
                    Some(r) => write!(f, "{}.{}(", self.local_name(r), call.callee)?,
                    None => write!(f, "{}(", call.callee)?,
                }
                for (i, a) in call.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(self.local_name(*a))?;
                }
                f.write_str(")")
            }
            Op::CheckType { local, expected } => {
                write!(f, "check {} instanceof {expected}", self.local_name(*local))
            }
            Op::Return(None) => f.write_str("return"),
            Op::Return(Some(l)) => write!(f, "return {}", self.local_name(*l)),
        }
    }
}

/// A method: signature plus body.
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    id: MethodId,
    sig: Signature,
    body: Body,
}

impl Method {
    /// This method's handle.
    pub fn id(&self) -> MethodId {
        self.id
    }

    /// This method's name.
    pub fn name(&self) -> &str {
        &self.sig.name
    }

    /// This method's signature.
    pub fn signature(&self) -> &Signature {
        &self.sig
    }

    /// This method's body.
    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// One class under evolution.
///
/// # Example
///
/// ```
/// use mutandis::{Mutant, Signature, Type};
///
/// let mut unit = Mutant::empty("Test0");
/// let before = unit.to_string();
///
/// let method = unit.add_method(Signature::new("m0", vec![Type::Int], Type::Void)).unwrap();
/// let local = unit.add_local(method, Type::Long).unwrap();
///
/// unit.remove_local(method, local).unwrap();
/// unit.remove_method(method).unwrap();
/// assert_eq!(unit.to_string(), before);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Mutant {
    name: String,
    super_name: String,
    fields: Vec<Field>,
    methods: Vec<Method>,
    next_handle: u32,
    next_member: u64,
}

impl Mutant {
    /// A unit with no members at all.
    ///
    /// Such a unit cannot be instantiated; it is mostly useful for seeds built
    /// by hand. Use [`Mutant::empty`] for a minimal instantiable unit.
    pub fn new(name: impl Into<String>) -> Self {
        Mutant {
            name: name.into(),
            super_name: OBJECT.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
            next_handle: 0,
            next_member: 0,
        }
    }

    /// A unit with nothing but the implicit default constructor.
    pub fn empty(name: impl Into<String>) -> Self {
        let mut unit = Self::new(name);
        let method = unit.build_method(Signature::constructor());
        unit.methods.push(method);
        unit
    }

    /// This unit's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of this unit's superclass.
    pub fn super_name(&self) -> &str {
        &self.super_name
    }

    /// The fields, in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The methods, in declaration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Look up a field by handle.
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Look up a method by handle.
    pub fn method(&self, id: MethodId) -> Option<&Method> {
        self.methods.iter().find(|m| m.id == id)
    }

    /// Look up a method by name.
    pub fn method_named(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.sig.name == name)
    }

    /// Whether `new` can instantiate this unit.
    pub fn has_constructor(&self) -> bool {
        self.method_named(CONSTRUCTOR).is_some()
    }

    /// A member name built from `prefix` that no field or method of this
    /// unit has used so far.
    pub fn fresh_member_name(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_member)
    }

    /// A reference to one of this unit's methods, suitable for a [`Call`].
    pub fn method_ref(&self, id: MethodId) -> Option<MethodRef> {
        self.method(id).map(|m| MethodRef {
            class: self.name.clone(),
            sig: m.sig.clone(),
        })
    }

    /// Add a field.
    pub fn add_field(&mut self, name: impl Into<String>, ty: Type, is_static: bool) -> Result<FieldId> {
        let name = name.into();
        if ty == Type::Void {
            return Err(Error::no_candidate("no eligible field type: void"));
        }
        if self.fields.iter().any(|f| f.name == name) {
            return Err(Error::no_candidate(format!(
                "{} already has a field named {name}",
                self.name
            )));
        }

        let id = FieldId(self.alloc());
        self.next_member += 1;
        self.fields.push(Field {
            id,
            name,
            ty,
            is_static,
        });
        Ok(id)
    }

    /// Remove a field added by [`add_field`][Mutant::add_field].
    pub fn remove_field(&mut self, id: FieldId) -> Result<Field> {
        let pos = self
            .fields
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in {}", self.name)))?;
        Ok(self.fields.remove(pos))
    }

    /// Add a method with an empty body.
    ///
    /// The body declares the receiver (for instance methods) and one local
    /// per parameter. A method returning a value gets a `ret` local that is
    /// initialised to the type's zero value and returned.
    pub fn add_method(&mut self, sig: Signature) -> Result<MethodId> {
        if self.method_named(&sig.name).is_some() {
            return Err(Error::no_candidate(format!(
                "{} already has a method named {}",
                self.name, sig.name
            )));
        }
        if sig.params.contains(&Type::Void) {
            return Err(Error::no_candidate("void is not a parameter type"));
        }
        if sig.is_constructor() && (sig.is_static || sig.ret != Type::Void) {
            return Err(Error::no_candidate(
                "constructors are void instance methods",
            ));
        }

        let method = self.build_method(sig);
        let id = method.id;
        self.next_member += 1;
        self.methods.push(method);
        Ok(id)
    }

    fn build_method(&mut self, sig: Signature) -> Method {
        let id = MethodId(self.alloc());
        let mut body = Body::default();

        if !sig.is_static {
            let this = LocalId(self.alloc());
            body.locals.push(Local {
                id: this,
                name: "this".to_string(),
                ty: Type::object(self.name.as_str()),
                kind: LocalKind::This,
            });
        }
        for (i, ty) in sig.params.iter().enumerate() {
            let param = LocalId(self.alloc());
            body.locals.push(Local {
                id: param,
                name: format!("p{i}"),
                ty: ty.clone(),
                kind: LocalKind::Param,
            });
        }

        let ret = if sig.ret == Type::Void {
            None
        } else {
            let ret = LocalId(self.alloc());
            body.locals.push(Local {
                id: ret,
                name: "ret".to_string(),
                ty: sig.ret.clone(),
                kind: LocalKind::Var,
            });
            body.instrs.push(Instr {
                id: InstrId(self.alloc()),
                op: Op::Assign {
                    dst: ret,
                    value: Value::default_for(&sig.ret),
                },
            });
            Some(ret)
        };
        body.instrs.push(Instr {
            id: InstrId(self.alloc()),
            op: Op::Return(ret),
        });

        Method { id, sig, body }
    }

    /// Remove a method added by [`add_method`][Mutant::add_method].
    pub fn remove_method(&mut self, id: MethodId) -> Result<Method> {
        let pos = self
            .methods
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in {}", self.name)))?;
        Ok(self.methods.remove(pos))
    }

    /// Add a variable slot to a method body.
    ///
    /// The slot is not assigned; see [`insert_instr`][Mutant::insert_instr].
    pub fn add_local(&mut self, method: MethodId, ty: Type) -> Result<LocalId> {
        if ty == Type::Void {
            return Err(Error::no_candidate("no eligible local type: void"));
        }
        self.method_or_err(method)?;

        let id = LocalId(self.alloc());
        let body = self.body_mut(method)?;
        body.locals.push(Local {
            id,
            name: format!("l{}", id.0),
            ty,
            kind: LocalKind::Var,
        });
        Ok(id)
    }

    /// Remove a variable slot added by [`add_local`][Mutant::add_local].
    ///
    /// Fails if any instruction still uses the local.
    pub fn remove_local(&mut self, method: MethodId, local: LocalId) -> Result<Local> {
        let body = self.body_mut(method)?;
        let pos = body
            .locals
            .iter()
            .position(|l| l.id == local)
            .ok_or_else(|| Error::invalid_handle(format!("{local} is not in {method}")))?;
        if body.locals[pos].kind != LocalKind::Var {
            return Err(Error::other(format!(
                "{local} is a receiver or parameter slot"
            )));
        }
        if body.is_referenced(local) {
            return Err(Error::other(format!("{local} is still referenced")));
        }
        Ok(body.locals.remove(pos))
    }

    /// Insert an instruction at `position` in a method body.
    ///
    /// `position` must lie before the body's trailing `return`, and every
    /// local the instruction mentions must belong to the body.
    pub fn insert_instr(&mut self, method: MethodId, position: usize, op: Op) -> Result<InstrId> {
        {
            let body = &self.method_or_err(method)?.body;
            if matches!(op, Op::Return(_)) {
                return Err(Error::other("a body has exactly one return"));
            }
            if position > body.insertion_end() {
                return Err(Error::no_candidate(format!(
                    "position {position} is past the end of {method}"
                )));
            }
            body.check_locals(&op)?;
            if let Op::Assign { dst, value } = &op {
                let ty = body.local(*dst).map(|l| &l.ty);
                if !ty.is_some_and(|ty| value.fits(ty)) {
                    return Err(Error::other("assigned value does not fit the local"));
                }
            }
        }

        let id = InstrId(self.alloc());
        self.body_mut(method)?
            .instrs
            .insert(position, Instr { id, op });
        Ok(id)
    }

    /// Insert a call at `position` in a method body.
    pub fn insert_call(&mut self, method: MethodId, position: usize, call: Call) -> Result<InstrId> {
        if call.args.len() != call.callee.sig.params.len() {
            return Err(Error::other(format!(
                "{} takes {} arguments, got {}",
                call.callee,
                call.callee.sig.params.len(),
                call.args.len()
            )));
        }
        if call.receiver.is_some() == call.callee.sig.is_static {
            return Err(Error::other(format!(
                "receiver does not match {}",
                call.callee
            )));
        }
        self.insert_instr(method, position, Op::Invoke(call))
    }

    /// Remove an instruction inserted by
    /// [`insert_instr`][Mutant::insert_instr] or
    /// [`insert_call`][Mutant::insert_call]; later instructions shift back
    /// into their previous positions.
    pub fn remove_instr(&mut self, method: MethodId, id: InstrId) -> Result<Instr> {
        let body = self.body_mut(method)?;
        let pos = body
            .position(id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in {method}")))?;
        if matches!(body.instrs[pos].op, Op::Return(_)) {
            return Err(Error::other("cannot remove a body's return"));
        }
        Ok(body.instrs.remove(pos))
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn method_or_err(&self, id: MethodId) -> Result<&Method> {
        self.method(id)
            .ok_or_else(|| Error::invalid_handle(format!("{id} is not in {}", self.name)))
    }

    fn body_mut(&mut self, id: MethodId) -> Result<&mut Body> {
        match self.methods.iter_mut().find(|m| m.id == id) {
            Some(m) => Ok(&mut m.body),
            None => Err(Error::invalid_handle(format!("{id} is not in {}", self.name))),
        }
    }
}

/// The human-readable structural dump of the unit.
impl fmt::Display for Mutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "class {} extends {} {{", self.name, self.super_name)?;
        for field in &self.fields {
            f.write_str("    ")?;
            if field.is_static {
                f.write_str("static ")?;
            }
            writeln!(f, "{} {};", field.ty, field.name)?;
        }
        for method in &self.methods {
            writeln!(f)?;
            writeln!(f, "    {} {{", method.sig)?;
            for local in &method.body.locals {
                writeln!(f, "        {} {};", local.ty, local.name)?;
            }
            if !method.body.locals.is_empty() {
                writeln!(f)?;
            }
            for instr in &method.body.instrs {
                f.write_str("        ")?;
                method.body.fmt_op(&instr.op, f)?;
                writeln!(f, ";")?;
            }
            writeln!(f, "    }}")?;
        }
        writeln!(f, "}}")
    }
}
