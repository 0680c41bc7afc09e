//! Runtime values
//!
//! Primitives appear in two forms: raw ([`Value::Primitive`]) as arguments and
//! results of primitive-typed methods, and boxed ([`Value::Boxed`]) wherever a
//! reference is expected, most notably in the argument arrays handed to
//! interceptors.

use std::fmt;
use std::sync::Arc;

use weaver_image::PrimitiveKind;

use crate::runtime::object::ObjectRef;

/// A primitive value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    /// `boolean`
    Boolean(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(char),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
}

impl Primitive {
    /// Kind of this primitive
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Byte(_) => PrimitiveKind::Byte,
            Primitive::Char(_) => PrimitiveKind::Char,
            Primitive::Short(_) => PrimitiveKind::Short,
            Primitive::Int(_) => PrimitiveKind::Int,
            Primitive::Long(_) => PrimitiveKind::Long,
            Primitive::Float(_) => PrimitiveKind::Float,
            Primitive::Double(_) => PrimitiveKind::Double,
        }
    }

    /// Zero value of a kind; `None` for `void`
    pub fn zero(kind: PrimitiveKind) -> Option<Primitive> {
        match kind {
            PrimitiveKind::Boolean => Some(Primitive::Boolean(false)),
            PrimitiveKind::Byte => Some(Primitive::Byte(0)),
            PrimitiveKind::Char => Some(Primitive::Char('\0')),
            PrimitiveKind::Short => Some(Primitive::Short(0)),
            PrimitiveKind::Int => Some(Primitive::Int(0)),
            PrimitiveKind::Long => Some(Primitive::Long(0)),
            PrimitiveKind::Float => Some(Primitive::Float(0.0)),
            PrimitiveKind::Double => Some(Primitive::Double(0.0)),
            PrimitiveKind::Void => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Boolean(v) => write!(f, "{}", v),
            Primitive::Byte(v) => write!(f, "{}", v),
            Primitive::Char(v) => write!(f, "{}", v),
            Primitive::Short(v) => write!(f, "{}", v),
            Primitive::Int(v) => write!(f, "{}", v),
            Primitive::Long(v) => write!(f, "{}", v),
            Primitive::Float(v) => write!(f, "{}", v),
            Primitive::Double(v) => write!(f, "{}", v),
        }
    }
}

/// A runtime value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Result of a `void` method
    #[default]
    Void,
    /// Null reference
    Null,
    /// Raw primitive
    Primitive(Primitive),
    /// Boxed primitive (`java.lang.Integer` and friends)
    Boxed(Primitive),
    /// `java.lang.String`
    Str(Arc<str>),
    /// Object reference
    Object(ObjectRef),
    /// Array reference
    Array(Arc<[Value]>),
}

impl Value {
    /// Raw `int`
    pub fn int(value: i32) -> Self {
        Value::Primitive(Primitive::Int(value))
    }

    /// Raw `long`
    pub fn long(value: i64) -> Self {
        Value::Primitive(Primitive::Long(value))
    }

    /// Raw `boolean`
    pub fn boolean(value: bool) -> Self {
        Value::Primitive(Primitive::Boolean(value))
    }

    /// Raw `double`
    pub fn double(value: f64) -> Self {
        Value::Primitive(Primitive::Double(value))
    }

    /// String reference
    pub fn string(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }

    /// Whether this is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is a `void` result
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// The primitive payload, raw or boxed
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Value::Primitive(p) | Value::Boxed(p) => Some(*p),
            _ => None,
        }
    }

    /// `int` payload, raw or boxed
    pub fn as_int(&self) -> Option<i32> {
        match self.primitive() {
            Some(Primitive::Int(v)) => Some(v),
            _ => None,
        }
    }

    /// `long` payload, raw or boxed
    pub fn as_long(&self) -> Option<i64> {
        match self.primitive() {
            Some(Primitive::Long(v)) => Some(v),
            _ => None,
        }
    }

    /// `boolean` payload, raw or boxed
    pub fn as_bool(&self) -> Option<bool> {
        match self.primitive() {
            Some(Primitive::Boolean(v)) => Some(v),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Reference form: raw primitives are boxed, everything else is unchanged
    pub fn boxed(self) -> Value {
        match self {
            Value::Primitive(p) => Value::Boxed(p),
            other => other,
        }
    }

    /// Runtime type name, for diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::Void => "void".to_string(),
            Value::Null => "null".to_string(),
            Value::Primitive(p) => p.kind().name().to_string(),
            Value::Boxed(p) => p.kind().box_class().to_string(),
            Value::Str(_) => weaver_image::descriptor::STRING_CLASS.to_string(),
            Value::Object(o) => o.class_name().to_string(),
            Value::Array(_) => "array".to_string(),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}
