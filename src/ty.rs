//! Value types of the virtual-machine model.

use std::fmt;

/// The root of the class hierarchy. Every reference type is assignable to it.
pub const OBJECT: &str = "Object";

/// Classes provided by the runtime.
///
/// These names are reserved in every [`Context`][crate::Context], can be
/// instantiated with `new`, and are used as reference types alongside the
/// program's own units.
pub const BUILTIN_CLASSES: &[&str] = &[OBJECT, "String", "Integer", "Thread"];

/// The type of a field, local, parameter, or return value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// No value; only valid as a return type.
    Void,
    /// A boolean.
    Bool,
    /// A 32-bit integer.
    Int,
    /// A 64-bit integer.
    Long,
    /// A 64-bit float.
    Double,
    /// A reference to an instance of the named class.
    Object(String),
}

impl Type {
    /// The primitive value types, in encoding order.
    pub const PRIMITIVES: [Type; 4] = [Type::Bool, Type::Int, Type::Long, Type::Double];

    /// A reference to the named class.
    pub fn object(class: impl Into<String>) -> Type {
        Type::Object(class.into())
    }

    /// Whether values of this type are references.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Object(_))
    }

    /// The referenced class, if this is a reference type.
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Object(name) => Some(name),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored where `self` is
    /// expected.
    ///
    /// Types must match exactly, except that any reference is assignable to
    /// [`OBJECT`].
    #[must_use]
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Void, _) | (_, Type::Void) => false,
            (Type::Object(name), Type::Object(_)) if name == OBJECT => true,
            _ => self == other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Bool => f.write_str("boolean"),
            Type::Int => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::Double => f.write_str("double"),
            Type::Object(name) => f.write_str(name),
        }
    }
}
