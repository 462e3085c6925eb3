//! Turning units into artifacts the runner can load.
//!
//! The encoding is a compact, deterministic binary image of a [`Mutant`]:
//! equal units always encode to equal bytes. Locals are written as indices
//! into their body's local table, the way a class file addresses slots,
//! rather than as the model's internal handles.

use crate::mutant::{Body, Call, Constant, LocalId, Mutant, Op, Signature, Value};
use crate::ty::Type;

/// The first bytes of every encoded unit.
pub const MAGIC: &[u8; 4] = b"MTDS";

/// The encoding version.
pub const VERSION: u8 = 1;

/// A loadable image of one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// The unit's name.
    pub name: String,
    /// The encoded unit.
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Encode `unit`.
    pub fn new(unit: &Mutant) -> Self {
        Artifact {
            name: unit.name().to_string(),
            bytes: encode(unit),
        }
    }
}

/// Encode `unit` into its binary form.
pub fn encode(unit: &Mutant) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    put_str(&mut out, unit.name());
    put_str(&mut out, unit.super_name());

    put_len(&mut out, unit.fields().len());
    for field in unit.fields() {
        out.push(u8::from(field.is_static));
        put_str(&mut out, &field.name);
        put_type(&mut out, &field.ty);
    }

    put_len(&mut out, unit.methods().len());
    for method in unit.methods() {
        put_sig(&mut out, method.signature());
        put_body(&mut out, method.body());
    }
    out
}

/// The human-readable structural dump of `unit`.
pub fn dump(unit: &Mutant) -> String {
    unit.to_string()
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    // LEB128.
    let mut n = len as u64;
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_len(out, s.len());
    out.extend_from_slice(s.as_bytes());
}

fn put_type(out: &mut Vec<u8>, ty: &Type) {
    match ty {
        Type::Void => out.push(b'V'),
        Type::Bool => out.push(b'Z'),
        Type::Int => out.push(b'I'),
        Type::Long => out.push(b'J'),
        Type::Double => out.push(b'D'),
        Type::Object(class) => {
            out.push(b'L');
            put_str(out, class);
        }
    }
}

fn put_sig(out: &mut Vec<u8>, sig: &Signature) {
    out.push(u8::from(sig.is_static));
    put_str(out, &sig.name);
    put_len(out, sig.params.len());
    for p in &sig.params {
        put_type(out, p);
    }
    put_type(out, &sig.ret);
}

fn put_slot(out: &mut Vec<u8>, body: &Body, local: LocalId) {
    // `Mutant` only accepts instructions whose locals belong to the body.
    let slot = body.locals().iter().position(|l| l.id() == local);
    debug_assert!(slot.is_some(), "{local} is not in the body being encoded");
    put_len(out, slot.unwrap_or(body.locals().len()));
}

fn put_opt_slot(out: &mut Vec<u8>, body: &Body, local: Option<LocalId>) {
    match local {
        Some(l) => {
            out.push(1);
            put_slot(out, body, l);
        }
        None => out.push(0),
    }
}

fn put_body(out: &mut Vec<u8>, body: &Body) {
    put_len(out, body.locals().len());
    for local in body.locals() {
        put_str(out, local.name());
        put_type(out, local.ty());
    }

    put_len(out, body.instrs().len());
    for instr in body.instrs() {
        match instr.op() {
            Op::Assign { dst, value } => {
                out.push(0x01);
                put_slot(out, body, *dst);
                match value {
                    Value::Const(Constant::Bool(b)) => {
                        out.push(b'Z');
                        out.push(u8::from(*b));
                    }
                    Value::Const(Constant::Int(i)) => {
                        out.push(b'I');
                        out.extend_from_slice(&i.to_le_bytes());
                    }
                    Value::Const(Constant::Long(l)) => {
                        out.push(b'J');
                        out.extend_from_slice(&l.to_le_bytes());
                    }
                    Value::Const(Constant::Double(d)) => {
                        out.push(b'D');
                        out.extend_from_slice(&d.to_bits().to_le_bytes());
                    }
                    Value::Null => out.push(b'N'),
                    Value::New(class) => {
                        out.push(b'L');
                        put_str(out, class);
                    }
                }
            }
            Op::Invoke(Call {
                callee,
                receiver,
                args,
                dst,
            }) => {
                out.push(0x02);
                put_str(out, &callee.class);
                put_sig(out, &callee.sig);
                put_opt_slot(out, body, *receiver);
                put_len(out, args.len());
                for a in args {
                    put_slot(out, body, *a);
                }
                put_opt_slot(out, body, *dst);
            }
            Op::CheckType { local, expected } => {
                out.push(0x03);
                put_slot(out, body, *local);
                put_type(out, expected);
            }
            Op::Return(local) => {
                out.push(0x04);
                put_opt_slot(out, body, *local);
            }
        }
    }
}
