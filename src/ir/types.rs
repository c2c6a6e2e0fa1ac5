//! The small type system the IR needs in order to select typed runtime
//! helpers for memory accesses.
//!
//! Real compiler IRs carry a much richer type system (vectors, aggregates,
//! opaque structs, function types, ...). The pass only ever needs to tell
//! those apart from the eight scalar shapes it knows how to route through
//! the runtime library, so `Type` keeps every other shape bundled into
//! `Other`, tagged with a name for diagnostics only.

use core::fmt;

/// A value type as seen by the instrumentation pass.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    F80,
    /// A pointer to any pointee type. The pass never needs to know what is
    /// pointed to; only whether a value is itself a pointer.
    Ptr,
    /// Void / no value (used as the "result type" of a call with no return).
    Void,
    /// Anything else: vectors, aggregates, opaque structs, function types.
    /// Accesses of this shape never resolve to a canonical type code and so
    /// always fall back to serialization.
    Other(&'static str),
}

impl Type {
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Ptr)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::F80 => write!(f, "f80"),
            Type::Ptr => write!(f, "ptr"),
            Type::Void => write!(f, "void"),
            Type::Other(name) => write!(f, "{name}"),
        }
    }
}

/// One of the eight canonical primitive type codes that select a typed
/// runtime helper for a memory access.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum CanonicalType {
    U1 = 0,
    U2 = 1,
    U4 = 2,
    U8 = 3,
    F32 = 4,
    F64 = 5,
    F80 = 6,
    Ptr = 7,
}

impl CanonicalType {
    pub const ALL: [CanonicalType; 8] = [
        CanonicalType::U1,
        CanonicalType::U2,
        CanonicalType::U4,
        CanonicalType::U8,
        CanonicalType::F32,
        CanonicalType::F64,
        CanonicalType::F80,
        CanonicalType::Ptr,
    ];

    /// The suffix used to name the typed runtime helper for this type, e.g.
    /// `"u4"` for `load_u4` / `store_u4`.
    pub fn suffix(self) -> &'static str {
        match self {
            CanonicalType::U1 => "u1",
            CanonicalType::U2 => "u2",
            CanonicalType::U4 => "u4",
            CanonicalType::U8 => "u8",
            CanonicalType::F32 => "f32",
            CanonicalType::F64 => "f64",
            CanonicalType::F80 => "f80",
            CanonicalType::Ptr => "ptr",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Resolve an IR type to its canonical code, if it has one.
///
/// Unresolved types (aggregates, vectors, opaque structs, `Void`) return
/// `None`; callers must treat that as "fall back to serialization", never as
/// an error.
pub fn canonical_type(ty: &Type) -> Option<CanonicalType> {
    match ty {
        Type::I8 => Some(CanonicalType::U1),
        Type::I16 => Some(CanonicalType::U2),
        Type::I32 => Some(CanonicalType::U4),
        Type::I64 => Some(CanonicalType::U8),
        Type::F32 => Some(CanonicalType::F32),
        Type::F64 => Some(CanonicalType::F64),
        Type::F80 => Some(CanonicalType::F80),
        Type::Ptr => Some(CanonicalType::Ptr),
        Type::Void | Type::Other(_) => None,
    }
}
