//! Method descriptors and signatures
//!
//! A [`Signature`] is a method's identity: its name plus a [`MethodDescriptor`]
//! (ordered parameter types and return type). Equality and hashing are purely
//! structural, so signatures are safe to use as cache and dispatch keys.
//!
//! Textual forms:
//!
//! | Form        | Example                          |
//! |-------------|----------------------------------|
//! | Descriptor  | `(ILjava/lang/String;)V`         |
//! | Key         | `add(II)I`                       |
//! | Declaration | `int add(int, int)`              |

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::descriptor::{parse_one, DescriptorError, TypeDescriptor};

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of static initializers
pub const STATIC_INIT_NAME: &str = "<clinit>";

/// Signature parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Declaration does not match `Ret name(Args)`
    #[error("Malformed signature '{0}'")]
    Malformed(String),

    /// Method name missing or invalid
    #[error("Invalid method name in '{0}'")]
    InvalidName(String),

    /// A type inside the signature failed to parse
    #[error("Invalid type in signature: {0}")]
    Type(#[from] DescriptorError),
}

/// Parameter and return types of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<TypeDescriptor>,
    /// Return type (`void` allowed)
    pub ret: TypeDescriptor,
}

impl MethodDescriptor {
    /// Create a descriptor
    pub fn new(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        Self { params, ret }
    }

    /// `()V`
    pub fn void() -> Self {
        Self::new(Vec::new(), TypeDescriptor::VOID)
    }

    /// Parse `(II)I`
    pub fn parse(descriptor: &str) -> Result<Self, SignatureError> {
        let malformed = || SignatureError::Malformed(descriptor.to_string());
        let mut chars = descriptor.char_indices().peekable();
        if chars.next().map(|(_, c)| c) != Some('(') {
            return Err(malformed());
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some((_, ')')) => {
                    chars.next();
                    break;
                }
                Some(_) => {
                    let param = parse_one(descriptor, &mut chars)?;
                    if param.is_void() {
                        return Err(DescriptorError::VoidNotAllowed(descriptor.to_string()).into());
                    }
                    params.push(param);
                }
                None => return Err(malformed()),
            }
        }

        let ret = parse_one(descriptor, &mut chars)?;
        if chars.peek().is_some() {
            return Err(DescriptorError::Trailing(descriptor.to_string()).into());
        }
        Ok(Self { params, ret })
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from("(");
        for param in &self.params {
            param.write_descriptor(&mut out);
        }
        out.push(')');
        self.ret.write_descriptor(&mut out);
        f.write_str(&out)
    }
}

/// A method identity: name + descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    name: Arc<str>,
    descriptor: MethodDescriptor,
}

impl Signature {
    /// Create a signature from its parts
    pub fn new(name: impl Into<Arc<str>>, descriptor: MethodDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }

    /// Create a signature from a name and a raw descriptor (`"(II)I"`)
    pub fn from_descriptor(name: &str, descriptor: &str) -> Result<Self, SignatureError> {
        validate_method_name(name, name)?;
        Ok(Self::new(name, MethodDescriptor::parse(descriptor)?))
    }

    /// Parse a declaration: `"int add(int, int)"`, `"void run()"`,
    /// `"String[] split(String)"`
    pub fn parse(declaration: &str) -> Result<Self, SignatureError> {
        let malformed = || SignatureError::Malformed(declaration.to_string());
        let text = declaration.trim();

        let open = text.find('(').ok_or_else(malformed)?;
        let args = text[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
        let head = text[..open].trim_end();
        let (ret, name) = head.rsplit_once(char::is_whitespace).ok_or_else(malformed)?;

        validate_method_name(name, declaration)?;
        let ret = TypeDescriptor::from_type_name(ret.trim())?;
        let params = parse_type_list(args, declaration)?;
        Ok(Self::new(name, MethodDescriptor::new(params, ret)))
    }

    /// Parse a constructor parameter list: `"int, String"` → `<init>(ILjava/lang/String;)V`
    pub fn parse_constructor(params: &str) -> Result<Self, SignatureError> {
        let params = parse_type_list(params, params)?;
        Ok(Self::constructor(params))
    }

    /// Constructor signature for the given parameter types
    pub fn constructor(params: Vec<TypeDescriptor>) -> Self {
        Self::new(CONSTRUCTOR_NAME, MethodDescriptor::new(params, TypeDescriptor::VOID))
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full descriptor
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Parameter types
    pub fn params(&self) -> &[TypeDescriptor] {
        &self.descriptor.params
    }

    /// Return type
    pub fn return_type(&self) -> &TypeDescriptor {
        &self.descriptor.ret
    }

    /// Whether this is an instance constructor
    pub fn is_constructor(&self) -> bool {
        &*self.name == CONSTRUCTOR_NAME
    }

    /// Compact key used for lookups: `add(II)I`
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Declaration form: `int add(int, int)`
    pub fn declaration(&self) -> String {
        let params: Vec<String> = self.params().iter().map(|p| p.class_name()).collect();
        format!(
            "{} {}({})",
            self.return_type().class_name(),
            self.name,
            params.join(", ")
        )
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

fn parse_type_list(list: &str, context: &str) -> Result<Vec<TypeDescriptor>, SignatureError> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return Err(SignatureError::Malformed(context.to_string()));
            }
            let ty = TypeDescriptor::from_type_name(part)?;
            if ty.is_void() {
                return Err(DescriptorError::VoidNotAllowed(context.to_string()).into());
            }
            Ok(ty)
        })
        .collect()
}

fn validate_method_name(name: &str, context: &str) -> Result<(), SignatureError> {
    let special = name == CONSTRUCTOR_NAME || name == STATIC_INIT_NAME;
    let plain = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if special || plain {
        Ok(())
    } else {
        Err(SignatureError::InvalidName(context.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declaration() {
        let sig = Signature::parse("int add(int, int)").unwrap();
        assert_eq!(sig.name(), "add");
        assert_eq!(sig.to_string(), "add(II)I");
        assert_eq!(sig.declaration(), "int add(int, int)");
    }

    #[test]
    fn test_parse_defaults_namespace() {
        let sig = Signature::parse("String greet()").unwrap();
        assert_eq!(sig.to_string(), "greet()Ljava/lang/String;");

        let sig = Signature::parse("void put(pkg.Key, Object[])").unwrap();
        assert_eq!(sig.to_string(), "put(Lpkg/Key;[Ljava/lang/Object;)V");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            Signature::parse("add(int)"),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            Signature::parse("int add(int"),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            Signature::parse("int 9lives()"),
            Err(SignatureError::InvalidName(_))
        ));
        assert!(Signature::parse("int add(int,)").is_err());
        assert!(Signature::parse("int add(void)").is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = Signature::parse("int add(int, int)").unwrap();
        let b = Signature::from_descriptor("add", "(II)I").unwrap();
        assert_eq!(a, b);

        let mut set = rustc_hash::FxHashSet::default();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_method_descriptor_parse() {
        let desc = MethodDescriptor::parse("(I[JLjava/lang/String;)V").unwrap();
        assert_eq!(desc.arity(), 3);
        assert!(desc.ret.is_void());
        assert_eq!(desc.to_string(), "(I[JLjava/lang/String;)V");

        assert!(MethodDescriptor::parse("II)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(V)V").is_err());
        assert!(MethodDescriptor::parse("()VI").is_err());
    }

    #[test]
    fn test_constructor_notation() {
        let sig = Signature::parse_constructor("int, String").unwrap();
        assert!(sig.is_constructor());
        assert_eq!(sig.to_string(), "<init>(ILjava/lang/String;)V");

        let sig = Signature::parse_constructor("").unwrap();
        assert_eq!(sig.to_string(), "<init>()V");
    }
}
