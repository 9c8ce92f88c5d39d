//! Values stored in reference slots, array elements and containers.
//!
//! Boxed primitives, strings and enum constants are immediate values: they are
//! compared by value and never duplicated. Everything mutable lives behind
//! [`Value::Ref`].

use crate::class::ClassId;
use crate::object::ObjRef;
use std::fmt;
use std::sync::Arc;

/// Primitive field / array element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    /// `bool`, one byte
    Bool,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// Unicode scalar, stored as `u32`
    Char,
}

impl PrimitiveKind {
    /// Storage width in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::Bool | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 | Self::Char => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Source-level name, used for array class names (`i32[]`)
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
        }
    }
}

/// A decoded primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// `bool`
    Bool(bool),
    /// `i8`
    I8(i8),
    /// `i16`
    I16(i16),
    /// `i32`
    I32(i32),
    /// `i64`
    I64(i64),
    /// `f32`
    F32(f32),
    /// `f64`
    F64(f64),
    /// `char`
    Char(char),
}

impl Primitive {
    /// The zero value of a kind
    pub const fn zero(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Bool => Self::Bool(false),
            PrimitiveKind::I8 => Self::I8(0),
            PrimitiveKind::I16 => Self::I16(0),
            PrimitiveKind::I32 => Self::I32(0),
            PrimitiveKind::I64 => Self::I64(0),
            PrimitiveKind::F32 => Self::F32(0.0),
            PrimitiveKind::F64 => Self::F64(0.0),
            PrimitiveKind::Char => Self::Char('\0'),
        }
    }

    /// Kind of this primitive
    pub const fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Bool(_) => PrimitiveKind::Bool,
            Self::I8(_) => PrimitiveKind::I8,
            Self::I16(_) => PrimitiveKind::I16,
            Self::I32(_) => PrimitiveKind::I32,
            Self::I64(_) => PrimitiveKind::I64,
            Self::F32(_) => PrimitiveKind::F32,
            Self::F64(_) => PrimitiveKind::F64,
            Self::Char(_) => PrimitiveKind::Char,
        }
    }

    /// Write the little-endian encoding into `out` (`out.len() == kind.width()`)
    pub fn encode(&self, out: &mut [u8]) {
        match *self {
            Self::Bool(b) => out[0] = b as u8,
            Self::I8(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I16(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::I64(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::F32(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::F64(v) => out.copy_from_slice(&v.to_le_bytes()),
            Self::Char(c) => out.copy_from_slice(&(c as u32).to_le_bytes()),
        }
    }

    /// Decode from little-endian bytes (`bytes.len() == kind.width()`)
    pub fn decode(kind: PrimitiveKind, bytes: &[u8]) -> Self {
        match kind {
            PrimitiveKind::Bool => Self::Bool(bytes[0] != 0),
            PrimitiveKind::I8 => Self::I8(i8::from_le_bytes([bytes[0]])),
            PrimitiveKind::I16 => Self::I16(i16::from_le_bytes([bytes[0], bytes[1]])),
            PrimitiveKind::I32 => Self::I32(i32::from_le_bytes(le4(bytes))),
            PrimitiveKind::I64 => Self::I64(i64::from_le_bytes(le8(bytes))),
            PrimitiveKind::F32 => Self::F32(f32::from_le_bytes(le4(bytes))),
            PrimitiveKind::F64 => Self::F64(f64::from_le_bytes(le8(bytes))),
            PrimitiveKind::Char => {
                Self::Char(char::from_u32(u32::from_le_bytes(le4(bytes))).unwrap_or('\0'))
            }
        }
    }

    /// Box into a [`Value`]
    pub fn to_value(self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(b),
            Self::I8(v) => Value::Int(v as i64),
            Self::I16(v) => Value::Int(v as i64),
            Self::I32(v) => Value::Int(v as i64),
            Self::I64(v) => Value::Int(v),
            Self::F32(v) => Value::Float(v as f64),
            Self::F64(v) => Value::Float(v),
            Self::Char(c) => Value::Char(c),
        }
    }

    /// Unbox a [`Value`] into `kind`, rejecting out-of-range integers
    pub fn from_value(kind: PrimitiveKind, value: &Value) -> Option<Self> {
        match (kind, value) {
            (PrimitiveKind::Bool, Value::Bool(b)) => Some(Self::Bool(*b)),
            (PrimitiveKind::I8, Value::Int(v)) => i8::try_from(*v).ok().map(Self::I8),
            (PrimitiveKind::I16, Value::Int(v)) => i16::try_from(*v).ok().map(Self::I16),
            (PrimitiveKind::I32, Value::Int(v)) => i32::try_from(*v).ok().map(Self::I32),
            (PrimitiveKind::I64, Value::Int(v)) => Some(Self::I64(*v)),
            (PrimitiveKind::F32, Value::Float(v)) => Some(Self::F32(*v as f32)),
            (PrimitiveKind::F32, Value::Int(v)) => Some(Self::F32(*v as f32)),
            (PrimitiveKind::F64, Value::Float(v)) => Some(Self::F64(*v)),
            (PrimitiveKind::F64, Value::Int(v)) => Some(Self::F64(*v as f64)),
            (PrimitiveKind::Char, Value::Char(c)) => Some(Self::Char(*c)),
            _ => None,
        }
    }
}

fn le4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

/// An enum constant. Constants are singletons, so they travel by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumConstant {
    /// Declaring enum class
    pub class: ClassId,
    /// Declaration index
    pub ordinal: u32,
    /// Constant name
    pub name: Arc<str>,
}

/// A value held in a reference slot
#[derive(Clone, Default)]
pub enum Value {
    /// No object
    #[default]
    Null,
    /// Boxed boolean
    Bool(bool),
    /// Boxed integer (all integral kinds widen to `i64`)
    Int(i64),
    /// Boxed float
    Float(f64),
    /// Boxed character
    Char(char),
    /// Immutable string
    Str(Arc<str>),
    /// Enum constant
    Enum(EnumConstant),
    /// Heap object reference
    Ref(ObjRef),
}

impl Value {
    /// Create a string value
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// Is this `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Is this a boxed primitive or enum constant
    pub fn is_boxed_primitive(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Char(_) | Self::Enum(_)
        )
    }

    /// Heap reference, if any
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Self::Ref(obj) => Some(obj),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Str(_) => "string",
            Self::Enum(_) => "enum",
            Self::Ref(_) => "object",
        }
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Self::Ref(obj)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

/// Equality is by value for immediates and by identity for heap references.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Enum(e) => write!(f, "{}", e.name),
            Self::Ref(obj) => write!(f, "{obj:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_encode_decode() {
        let mut buf = [0u8; 8];
        Primitive::I32(-7).encode(&mut buf[..4]);
        assert_eq!(Primitive::decode(PrimitiveKind::I32, &buf[..4]), Primitive::I32(-7));

        Primitive::F64(1.5).encode(&mut buf);
        assert_eq!(Primitive::decode(PrimitiveKind::F64, &buf), Primitive::F64(1.5));

        Primitive::Char('λ').encode(&mut buf[..4]);
        assert_eq!(Primitive::decode(PrimitiveKind::Char, &buf[..4]), Primitive::Char('λ'));
    }

    #[test]
    fn test_from_value_range_checks() {
        assert_eq!(
            Primitive::from_value(PrimitiveKind::I8, &Value::Int(127)),
            Some(Primitive::I8(127))
        );
        assert_eq!(Primitive::from_value(PrimitiveKind::I8, &Value::Int(128)), None);
        assert_eq!(Primitive::from_value(PrimitiveKind::Bool, &Value::Int(1)), None);
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::string("a"), Value::string("a"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert!(Value::Int(3).is_boxed_primitive());
        assert!(!Value::string("s").is_boxed_primitive());
    }
}
