//! Type descriptors
//!
//! A [`TypeDescriptor`] is the canonical reference to a type as it appears in
//! method descriptors and class images:
//!
//! | Kind      | Semantic name        | Descriptor             |
//! |-----------|----------------------|------------------------|
//! | Primitive | `int`                | `I`                    |
//! | Object    | `java.lang.String`   | `Ljava/lang/String;`   |
//! | Array     | `int[][]`            | `[[I`                  |
//!
//! Semantic names use `.` as the namespace separator, internal names use `/`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Namespace that unqualified type names resolve to
pub const DEFAULT_NAMESPACE: &str = "java.lang";

/// Class name of the root reference type
pub const OBJECT_CLASS: &str = "java.lang.Object";

/// Class name of the string type
pub const STRING_CLASS: &str = "java.lang.String";

/// Descriptor parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Input ended before a complete descriptor was read
    #[error("Unexpected end of descriptor '{0}'")]
    UnexpectedEnd(String),

    /// Unknown descriptor character
    #[error("Invalid descriptor character '{ch}' in '{descriptor}'")]
    InvalidChar {
        /// The offending character
        ch: char,
        /// Full descriptor text
        descriptor: String,
    },

    /// Extra characters after a complete descriptor
    #[error("Trailing characters in descriptor '{0}'")]
    Trailing(String),

    /// Empty or malformed type name
    #[error("Invalid type name '{0}'")]
    InvalidName(String),

    /// `void` used where a value type is required
    #[error("void is not allowed here: '{0}'")]
    VoidNotAllowed(String),
}

/// Primitive type kinds, including `void`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `void` (return types only)
    Void,
}

impl PrimitiveKind {
    /// All primitive kinds in boxing table order
    pub const ALL: [PrimitiveKind; 9] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Char,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
        PrimitiveKind::Void,
    ];

    /// Single-character descriptor code
    pub fn descriptor_char(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Void => 'V',
        }
    }

    /// Look up a kind by descriptor code
    pub fn from_descriptor_char(ch: char) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.descriptor_char() == ch)
    }

    /// Source-level keyword
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::Void => "void",
        }
    }

    /// Look up a kind by source-level keyword
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Class name of the wrapper type (`int` → `java.lang.Integer`)
    pub fn box_class(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java.lang.Boolean",
            PrimitiveKind::Byte => "java.lang.Byte",
            PrimitiveKind::Char => "java.lang.Character",
            PrimitiveKind::Short => "java.lang.Short",
            PrimitiveKind::Int => "java.lang.Integer",
            PrimitiveKind::Long => "java.lang.Long",
            PrimitiveKind::Float => "java.lang.Float",
            PrimitiveKind::Double => "java.lang.Double",
            PrimitiveKind::Void => "java.lang.Void",
        }
    }

    /// Reverse of [`PrimitiveKind::box_class`]
    pub fn from_box_class(class_name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.box_class() == class_name)
    }

    /// Whether the wrapper type extends `java.lang.Number`
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte
                | PrimitiveKind::Short
                | PrimitiveKind::Int
                | PrimitiveKind::Long
                | PrimitiveKind::Float
                | PrimitiveKind::Double
        )
    }
}

/// A type reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDescriptor {
    /// Primitive or void
    Primitive(PrimitiveKind),
    /// Reference type, stored as its internal name (`java/lang/String`)
    Object(Arc<str>),
    /// Array of the element type
    Array(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    /// `void`
    pub const VOID: TypeDescriptor = TypeDescriptor::Primitive(PrimitiveKind::Void);
    /// `int`
    pub const INT: TypeDescriptor = TypeDescriptor::Primitive(PrimitiveKind::Int);
    /// `boolean`
    pub const BOOLEAN: TypeDescriptor = TypeDescriptor::Primitive(PrimitiveKind::Boolean);

    /// Reference type from a dotted class name
    pub fn object(class_name: &str) -> Self {
        TypeDescriptor::Object(Arc::from(to_internal_name(class_name)))
    }

    /// `java.lang.Object`
    pub fn object_root() -> Self {
        Self::object(OBJECT_CLASS)
    }

    /// `java.lang.String`
    pub fn string() -> Self {
        Self::object(STRING_CLASS)
    }

    /// Array with this descriptor as element type
    pub fn array_of(self) -> Self {
        TypeDescriptor::Array(Box::new(self))
    }

    /// Parse a single field descriptor (`I`, `Ljava/lang/String;`, `[[J`)
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let mut chars = descriptor.char_indices().peekable();
        let ty = parse_one(descriptor, &mut chars)?;
        if chars.peek().is_some() {
            return Err(DescriptorError::Trailing(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Parse a semantic type name (`int`, `String`, `java.util.List[]`).
    ///
    /// Unqualified names that are not primitives resolve into
    /// [`DEFAULT_NAMESPACE`].
    pub fn from_type_name(name: &str) -> Result<Self, DescriptorError> {
        let name = name.trim();
        if let Some(element) = name.strip_suffix("[]") {
            let element = Self::from_type_name(element)?;
            if element.is_void() {
                return Err(DescriptorError::VoidNotAllowed(name.to_string()));
            }
            return Ok(element.array_of());
        }
        if name.is_empty() || !is_valid_class_name(name) {
            return Err(DescriptorError::InvalidName(name.to_string()));
        }
        if let Some(kind) = PrimitiveKind::from_name(name) {
            return Ok(TypeDescriptor::Primitive(kind));
        }
        if name.contains('.') {
            Ok(Self::object(name))
        } else {
            Ok(Self::object(&format!("{}.{}", DEFAULT_NAMESPACE, name)))
        }
    }

    /// Descriptor text
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    pub(crate) fn write_descriptor(&self, out: &mut String) {
        match self {
            TypeDescriptor::Primitive(kind) => out.push(kind.descriptor_char()),
            TypeDescriptor::Object(internal) => {
                out.push('L');
                out.push_str(internal);
                out.push(';');
            }
            TypeDescriptor::Array(element) => {
                out.push('[');
                element.write_descriptor(out);
            }
        }
    }

    /// Semantic name (`int`, `java.lang.String`, `int[]`)
    pub fn class_name(&self) -> String {
        match self {
            TypeDescriptor::Primitive(kind) => kind.name().to_string(),
            TypeDescriptor::Object(internal) => to_class_name(internal),
            TypeDescriptor::Array(element) => format!("{}[]", element.class_name()),
        }
    }

    /// Internal name for reference types
    pub fn internal_name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Object(internal) => Some(internal),
            _ => None,
        }
    }

    /// Whether this is a primitive (including void)
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive(_))
    }

    /// Whether this is `void`
    pub fn is_void(&self) -> bool {
        matches!(self, TypeDescriptor::Primitive(PrimitiveKind::Void))
    }

    /// Whether this is an array type
    pub fn is_array(&self) -> bool {
        matches!(self, TypeDescriptor::Array(_))
    }

    /// Whether values of this type are references
    pub fn is_reference(&self) -> bool {
        !self.is_primitive()
    }

    /// Primitive kind, if any
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            TypeDescriptor::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Number of array dimensions
    pub fn dimensions(&self) -> usize {
        match self {
            TypeDescriptor::Array(element) => 1 + element.dimensions(),
            _ => 0,
        }
    }

    /// Element type of an array
    pub fn element(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Wrapper type for primitives; references are returned unchanged
    pub fn boxed(&self) -> TypeDescriptor {
        match self {
            TypeDescriptor::Primitive(kind) => Self::object(kind.box_class()),
            other => other.clone(),
        }
    }

    /// Primitive kind for wrapper types (`java.lang.Integer` → `int`)
    pub fn unboxed(&self) -> Option<PrimitiveKind> {
        match self {
            TypeDescriptor::Primitive(kind) => Some(*kind),
            TypeDescriptor::Object(_) => PrimitiveKind::from_box_class(&self.class_name()),
            TypeDescriptor::Array(_) => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name())
    }
}

pub(crate) fn parse_one(
    descriptor: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<TypeDescriptor, DescriptorError> {
    let (start, ch) = chars
        .next()
        .ok_or_else(|| DescriptorError::UnexpectedEnd(descriptor.to_string()))?;
    match ch {
        '[' => {
            let element = parse_one(descriptor, chars)?;
            if element.is_void() {
                return Err(DescriptorError::VoidNotAllowed(descriptor.to_string()));
            }
            Ok(element.array_of())
        }
        'L' => {
            for (idx, c) in chars.by_ref() {
                if c == ';' {
                    let internal = &descriptor[start + 1..idx];
                    if internal.is_empty() {
                        return Err(DescriptorError::InvalidName(descriptor.to_string()));
                    }
                    return Ok(TypeDescriptor::Object(Arc::from(internal)));
                }
            }
            Err(DescriptorError::UnexpectedEnd(descriptor.to_string()))
        }
        other => PrimitiveKind::from_descriptor_char(other)
            .map(TypeDescriptor::Primitive)
            .ok_or_else(|| DescriptorError::InvalidChar {
                ch: other,
                descriptor: descriptor.to_string(),
            }),
    }
}

/// `java.lang.String` → `java/lang/String`
pub fn to_internal_name(class_name: &str) -> String {
    class_name.replace('.', "/")
}

/// `java/lang/String` → `java.lang.String`
pub fn to_class_name(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}

/// Package part of a dotted class name (`""` for the default package)
pub fn package_name(class_name: &str) -> &str {
    class_name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
}

/// Simple name of a dotted class name
pub fn short_name(class_name: &str) -> &str {
    class_name.rsplit_once('.').map(|(_, name)| name).unwrap_or(class_name)
}

fn is_valid_class_name(name: &str) -> bool {
    !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(TypeDescriptor::parse("I").unwrap(), TypeDescriptor::INT);
        assert_eq!(TypeDescriptor::parse("V").unwrap(), TypeDescriptor::VOID);
        assert!(TypeDescriptor::parse("Q").is_err());
    }

    #[test]
    fn test_parse_object_and_array() {
        let ty = TypeDescriptor::parse("[[Ljava/lang/String;").unwrap();
        assert_eq!(ty.dimensions(), 2);
        assert_eq!(ty.class_name(), "java.lang.String[][]");
        assert_eq!(ty.descriptor(), "[[Ljava/lang/String;");
    }

    #[test]
    fn test_parse_rejects_trailing_and_truncated() {
        assert!(matches!(
            TypeDescriptor::parse("II"),
            Err(DescriptorError::Trailing(_))
        ));
        assert!(matches!(
            TypeDescriptor::parse("Ljava/lang/String"),
            Err(DescriptorError::UnexpectedEnd(_))
        ));
        assert!(TypeDescriptor::parse("[V").is_err());
    }

    #[test]
    fn test_from_type_name_defaults_namespace() {
        let ty = TypeDescriptor::from_type_name("String").unwrap();
        assert_eq!(ty, TypeDescriptor::string());

        let ty = TypeDescriptor::from_type_name("pkg.Base[]").unwrap();
        assert_eq!(ty.descriptor(), "[Lpkg/Base;");

        assert!(TypeDescriptor::from_type_name("").is_err());
        assert!(TypeDescriptor::from_type_name("a..b").is_err());
        assert!(TypeDescriptor::from_type_name("void[]").is_err());
    }

    #[test]
    fn test_boxing_tables() {
        assert_eq!(TypeDescriptor::INT.boxed().class_name(), "java.lang.Integer");
        assert_eq!(
            TypeDescriptor::object("java.lang.Long").unboxed(),
            Some(PrimitiveKind::Long)
        );
        assert_eq!(TypeDescriptor::string().unboxed(), None);
        assert_eq!(TypeDescriptor::string().boxed(), TypeDescriptor::string());
        assert!(PrimitiveKind::Double.is_numeric());
        assert!(!PrimitiveKind::Char.is_numeric());
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(package_name("pkg.sub.Base"), "pkg.sub");
        assert_eq!(package_name("Base"), "");
        assert_eq!(short_name("pkg.sub.Base"), "Base");
    }
}
