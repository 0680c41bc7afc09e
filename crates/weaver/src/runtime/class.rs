//! Class definitions and linked runtime classes
//!
//! Classes are declared with [`ClassDefinition`] and linked by the
//! [`TypeLoader`](crate::runtime::TypeLoader) into a [`RuntimeClass`], which
//! carries the resolved virtual method table.
//!
//! Method bodies come in three forms:
//!
//! | Body     | Declared with                          | Image form          |
//! |----------|----------------------------------------|---------------------|
//! | Native   | [`MethodDefinition::new`]              | `native`, no code   |
//! | Code     | [`MethodDefinition::code`], bridges    | instruction list    |
//! | Abstract | [`MethodDefinition::abstract_method`]  | `abstract`, no code |

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use weaver_image::{AccessFlags, Insn, Signature, TypeDescriptor};

use crate::error::{InvokeError, InvokeResult};
use crate::runtime::object::ObjectRef;
use crate::runtime::value::Value;

/// Host implementation of a method
pub type NativeFn = Arc<dyn Fn(&CallContext<'_>) -> InvokeResult<Value> + Send + Sync>;

// ===== Definitions =====

/// How a declared body is provided
#[derive(Clone)]
pub(crate) enum BodySpec {
    Native(NativeFn),
    Code(Vec<Insn>),
    Abstract,
    /// Delegate to `target` on the declaring class (compiler-style bridge)
    Bridge { target: String },
    /// Re-declare the superclass implementation (visibility widening)
    SuperBridge,
}

/// Definition of a field
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,
    /// Semantic type name
    pub type_name: String,
    /// Access flags
    pub access: AccessFlags,
}

impl FieldDefinition {
    /// Private field of the given type
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            access: AccessFlags::PRIVATE,
        }
    }
}

/// Definition of a method
#[derive(Clone)]
pub struct MethodDefinition {
    /// Declaration, e.g. `int add(int, int)`
    pub declaration: String,
    /// Access flags
    pub access: AccessFlags,
    /// Declared exception class names
    pub exceptions: Vec<String>,
    pub(crate) body: BodySpec,
}

impl MethodDefinition {
    /// Public method implemented by a host closure
    pub fn new<F>(declaration: &str, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> InvokeResult<Value> + Send + Sync + 'static,
    {
        Self::with_body(declaration, AccessFlags::PUBLIC, BodySpec::Native(Arc::new(body)))
    }

    /// Public abstract method
    pub fn abstract_method(declaration: &str) -> Self {
        Self::with_body(
            declaration,
            AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
            BodySpec::Abstract,
        )
    }

    /// Public method with an instruction body
    pub fn code(declaration: &str, code: Vec<Insn>) -> Self {
        Self::with_body(declaration, AccessFlags::PUBLIC, BodySpec::Code(code))
    }

    /// Synthetic bridge delegating to `target` on the same class, the way a
    /// compiler bridges covariant returns and erased generics
    pub fn bridge(declaration: &str, target: &str) -> Self {
        Self::with_body(
            declaration,
            AccessFlags::PUBLIC | AccessFlags::BRIDGE | AccessFlags::SYNTHETIC,
            BodySpec::Bridge {
                target: target.to_string(),
            },
        )
    }

    /// Synthetic bridge that re-declares the superclass method of the same
    /// signature, the way a compiler widens visibility of inherited methods
    pub fn super_bridge(declaration: &str) -> Self {
        Self::with_body(
            declaration,
            AccessFlags::PUBLIC | AccessFlags::BRIDGE | AccessFlags::SYNTHETIC,
            BodySpec::SuperBridge,
        )
    }

    fn with_body(declaration: &str, access: AccessFlags, body: BodySpec) -> Self {
        Self {
            declaration: declaration.to_string(),
            access,
            exceptions: Vec::new(),
            body,
        }
    }

    /// Mark as final
    pub fn as_final(mut self) -> Self {
        self.access |= AccessFlags::FINAL;
        self
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.access |= AccessFlags::STATIC;
        self
    }

    /// Make private
    pub fn as_private(mut self) -> Self {
        self.access = self.access.without(AccessFlags::PUBLIC | AccessFlags::PROTECTED)
            | AccessFlags::PRIVATE;
        self
    }

    /// Make protected
    pub fn as_protected(mut self) -> Self {
        self.access = self.access.without(AccessFlags::PUBLIC | AccessFlags::PRIVATE)
            | AccessFlags::PROTECTED;
        self
    }

    /// Make package-private
    pub fn as_package_private(mut self) -> Self {
        self.access = self
            .access
            .without(AccessFlags::PUBLIC | AccessFlags::PRIVATE | AccessFlags::PROTECTED);
        self
    }

    /// Mark as synchronized
    pub fn as_synchronized(mut self) -> Self {
        self.access |= AccessFlags::SYNCHRONIZED;
        self
    }

    /// Declare an exception
    pub fn throws(mut self, class_name: &str) -> Self {
        self.exceptions.push(class_name.to_string());
        self
    }
}

impl fmt::Debug for MethodDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDefinition")
            .field("declaration", &self.declaration)
            .field("access", &self.access)
            .finish()
    }
}

/// Definition of a constructor
#[derive(Clone)]
pub struct ConstructorDefinition {
    /// Parameter list, e.g. `int, String`
    pub params: String,
    /// Access flags
    pub access: AccessFlags,
    pub(crate) body: NativeFn,
}

impl ConstructorDefinition {
    /// Public constructor implemented by a host closure
    pub fn new<F>(params: &str, body: F) -> Self
    where
        F: Fn(&CallContext<'_>) -> InvokeResult<Value> + Send + Sync + 'static,
    {
        Self {
            params: params.to_string(),
            access: AccessFlags::PUBLIC,
            body: Arc::new(body),
        }
    }

    /// Make private
    pub fn as_private(mut self) -> Self {
        self.access = AccessFlags::PRIVATE;
        self
    }

    /// Make protected
    pub fn as_protected(mut self) -> Self {
        self.access = AccessFlags::PROTECTED;
        self
    }
}

impl fmt::Debug for ConstructorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDefinition")
            .field("params", &self.params)
            .field("access", &self.access)
            .finish()
    }
}

/// Definition of a class or interface
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    /// Dotted class name
    pub name: String,
    /// Access flags
    pub access: AccessFlags,
    /// Superclass name
    pub super_name: String,
    /// Implemented (or, for interfaces, extended) interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldDefinition>,
    /// Declared methods
    pub methods: Vec<MethodDefinition>,
    /// Declared constructors; a public no-arg constructor is implied when empty
    pub constructors: Vec<ConstructorDefinition>,
}

impl ClassDefinition {
    /// Public class extending `java.lang.Object`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: AccessFlags::PUBLIC,
            super_name: crate::defaults::OBJECT_CLASS.to_string(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Public interface
    pub fn interface(name: &str) -> Self {
        Self {
            access: AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
            ..Self::new(name)
        }
    }

    /// Set the superclass
    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = super_name.to_string();
        self
    }

    /// Add an interface
    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Mark as final
    pub fn as_final(mut self) -> Self {
        self.access |= AccessFlags::FINAL;
        self
    }

    /// Mark as abstract
    pub fn as_abstract(mut self) -> Self {
        self.access |= AccessFlags::ABSTRACT;
        self
    }

    /// Add a field
    pub fn add_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method
    pub fn add_method(mut self, method: MethodDefinition) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a constructor
    pub fn add_constructor(mut self, constructor: ConstructorDefinition) -> Self {
        self.constructors.push(constructor);
        self
    }
}

// ===== Linked classes =====

/// Executable body of a linked method
#[derive(Clone)]
pub enum MethodBody {
    /// Host closure
    Native(NativeFn),
    /// Instruction list run by the interpreter
    Code(Arc<[Insn]>),
    /// No body
    Abstract,
}

/// A linked method
#[derive(Clone)]
pub struct MethodDef {
    /// Declaring class
    pub owner: Arc<str>,
    /// Access flags
    pub access: AccessFlags,
    /// Identity
    pub signature: Signature,
    /// Declared exceptions
    pub exceptions: Vec<String>,
    /// Body
    pub body: MethodBody,
}

impl MethodDef {
    /// Whether the method has no body
    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MethodBody::Abstract)
    }

    /// Whether the method participates in virtual dispatch
    pub fn is_virtual(&self) -> bool {
        !self.access.is_static() && !self.access.is_private() && !self.signature.is_constructor()
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match self.body {
            MethodBody::Native(_) => "native",
            MethodBody::Code(_) => "code",
            MethodBody::Abstract => "abstract",
        };
        write!(f, "{}.{} [{}] ({})", self.owner, self.signature, self.access, body)
    }
}

/// A class linked against its superclass and interfaces
pub struct RuntimeClass {
    name: Arc<str>,
    access: AccessFlags,
    superclass: Option<Arc<RuntimeClass>>,
    interfaces: Vec<Arc<RuntimeClass>>,
    fields: Vec<(String, TypeDescriptor)>,
    declared: Vec<Arc<MethodDef>>,
    declared_index: FxHashMap<Signature, usize>,
    vtable: FxHashMap<Signature, Arc<MethodDef>>,
    generated: bool,
}

impl RuntimeClass {
    /// Link a class from its declared members
    pub(crate) fn link(
        name: Arc<str>,
        access: AccessFlags,
        superclass: Option<Arc<RuntimeClass>>,
        interfaces: Vec<Arc<RuntimeClass>>,
        fields: Vec<(String, TypeDescriptor)>,
        declared: Vec<Arc<MethodDef>>,
        generated: bool,
    ) -> Self {
        let mut vtable = superclass
            .as_ref()
            .map(|sup| sup.vtable.clone())
            .unwrap_or_default();
        for method in declared.iter().filter(|m| m.is_virtual()) {
            vtable.insert(method.signature.clone(), method.clone());
        }
        for iface in &interfaces {
            for (sig, method) in &iface.vtable {
                vtable.entry(sig.clone()).or_insert_with(|| method.clone());
            }
        }

        let declared_index = declared
            .iter()
            .enumerate()
            .map(|(i, m)| (m.signature.clone(), i))
            .collect();

        Self {
            name,
            access,
            superclass,
            interfaces,
            fields,
            declared,
            declared_index,
            vtable,
            generated,
        }
    }

    /// Dotted class name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Access flags
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Superclass, `None` for the root class
    pub fn superclass(&self) -> Option<&Arc<RuntimeClass>> {
        self.superclass.as_ref()
    }

    /// Directly implemented interfaces
    pub fn interfaces(&self) -> &[Arc<RuntimeClass>] {
        &self.interfaces
    }

    /// Declared fields
    pub fn fields(&self) -> &[(String, TypeDescriptor)] {
        &self.fields
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    /// Whether this class is final
    pub fn is_final(&self) -> bool {
        self.access.is_final()
    }

    /// Whether this class was produced by the proxy generator
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Package of this class
    pub fn package(&self) -> &str {
        weaver_image::descriptor::package_name(&self.name)
    }

    /// Declared methods and constructors, in declaration order
    pub fn declared_methods(&self) -> &[Arc<MethodDef>] {
        &self.declared
    }

    /// Declared method or constructor by signature
    pub fn declared_method(&self, signature: &Signature) -> Option<&Arc<MethodDef>> {
        self.declared_index
            .get(signature)
            .map(|&index| &self.declared[index])
    }

    /// Declared constructors
    pub fn constructors(&self) -> impl Iterator<Item = &Arc<MethodDef>> {
        self.declared.iter().filter(|m| m.signature.is_constructor())
    }

    /// Virtual dispatch target for a signature
    pub fn lookup_virtual(&self, signature: &Signature) -> Option<&Arc<MethodDef>> {
        self.vtable.get(signature)
    }

    /// Resolve a non-virtual call: search this class, then its superclasses
    pub fn resolve_special(&self, signature: &Signature) -> Option<&Arc<MethodDef>> {
        if let Some(method) = self.declared_method(signature) {
            return Some(method);
        }
        if signature.is_constructor() {
            return None;
        }
        match &self.superclass {
            Some(sup) => sup.resolve_special(signature),
            None => self.vtable.get(signature),
        }
    }

    /// This class or the nearest superclass with the given name
    pub fn find_ancestor(&self, name: &str) -> Option<&RuntimeClass> {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name() == name {
                return Some(class);
            }
            current = class.superclass.as_deref();
        }
        None
    }

    /// Whether instances of this class are instances of `name`
    pub fn is_subtype_of(&self, name: &str) -> bool {
        if self.name() == name {
            return true;
        }
        if self.interfaces.iter().any(|iface| iface.is_subtype_of(name)) {
            return true;
        }
        self.superclass
            .as_ref()
            .is_some_and(|sup| sup.is_subtype_of(name))
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name()))
            .field("methods", &self.declared.len())
            .finish()
    }
}

// ===== Call context =====

/// What a native body sees of its invocation
pub struct CallContext<'a> {
    /// Receiver
    pub this: &'a ObjectRef,
    /// Arguments, raw for primitive parameters
    pub args: &'a [Value],
    /// Declaring class of the calling method, `None` for external calls
    pub caller: Option<&'a str>,
    /// The method being run
    pub method: &'a MethodDef,
}

impl<'a> CallContext<'a> {
    /// Argument by index
    pub fn arg(&self, index: usize) -> InvokeResult<&Value> {
        self.args.get(index).ok_or_else(|| InvokeError::ArgumentCount {
            signature: self.method.signature.to_string(),
            expected: self.method.signature.params().len(),
            actual: self.args.len(),
        })
    }

    /// `int` argument by index
    pub fn int_arg(&self, index: usize) -> InvokeResult<i32> {
        let value = self.arg(index)?;
        value.as_int().ok_or_else(|| InvokeError::ClassCast {
            from: value.type_name(),
            to: "int".to_string(),
        })
    }

    /// String argument by index (`None` for null)
    pub fn str_arg(&self, index: usize) -> InvokeResult<Option<&str>> {
        match self.arg(index)? {
            Value::Null => Ok(None),
            Value::Str(s) => Ok(Some(s)),
            other => Err(InvokeError::ClassCast {
                from: other.type_name(),
                to: weaver_image::descriptor::STRING_CLASS.to_string(),
            }),
        }
    }

    /// Virtual call on `target`, reporting this method's class as the caller
    pub fn invoke(&self, target: &ObjectRef, declaration: &str, args: &[Value]) -> InvokeResult<Value> {
        let signature = Signature::parse(declaration)?;
        target.invoke_from(Some(&self.method.owner), &signature, args)
    }

    /// Virtual call on the receiver
    pub fn invoke_self(&self, declaration: &str, args: &[Value]) -> InvokeResult<Value> {
        self.invoke(self.this, declaration, args)
    }

    /// Call the superclass implementation of a method
    pub fn invoke_super(&self, declaration: &str, args: &[Value]) -> InvokeResult<Value> {
        let signature = Signature::parse(declaration)?;
        self.special_on_super(&signature, args)
    }

    /// Run a superclass constructor (`params` as in `"int, String"`)
    pub fn super_init(&self, params: &str, args: &[Value]) -> InvokeResult<Value> {
        let signature = Signature::parse_constructor(params)?;
        self.special_on_super(&signature, args)
    }

    fn special_on_super(&self, signature: &Signature, args: &[Value]) -> InvokeResult<Value> {
        let owner = self
            .this
            .class()
            .find_ancestor(&self.method.owner)
            .and_then(|class| class.superclass())
            .ok_or_else(|| InvokeError::NoSuchMethod {
                class: self.method.owner.to_string(),
                signature: signature.to_string(),
            })?;
        self.this
            .invoke_special(Some(&self.method.owner), owner.name(), signature, args)
    }
}
