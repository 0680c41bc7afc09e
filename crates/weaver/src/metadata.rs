//! Type metadata reader
//!
//! Extracts structural facts from a class image without linking or running
//! it. The scan is a [`ClassVisitor`] that never asks for method bodies, so
//! code sections are skipped wholesale.

use std::ops::ControlFlow;
use std::sync::Arc;

use weaver_image::{
    AccessFlags, ClassHeader, ClassReader, ClassVisitor, FieldImage, MethodAction, MethodHeader,
    Signature, TypeDescriptor,
};

use crate::error::{WeaverError, WeaverResult};

/// Source of class images, keyed by dotted class name
pub trait ArtifactSource: Send + Sync {
    /// Encoded image of `class_name`, if one exists
    fn artifact(&self, class_name: &str) -> Option<Arc<[u8]>>;
}

/// A method eligible for interception, as handed to filters and callbacks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRecord {
    /// Declaring class
    pub owner: Arc<str>,
    /// Identity
    pub signature: Signature,
    /// Access flags as declared
    pub access: AccessFlags,
    /// Declared exception class names
    pub exceptions: Vec<String>,
}

impl MethodRecord {
    /// Method name
    pub fn name(&self) -> &str {
        self.signature.name()
    }

    /// Declaration form, e.g. `int add(int, int)`
    pub fn declaration(&self) -> String {
        self.signature.declaration()
    }

    /// Whether the original implementation is abstract
    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    /// Whether the method is a compiler bridge
    pub fn is_bridge(&self) -> bool {
        self.access.is_bridge()
    }
}

/// Declared member of a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    /// Access flags
    pub access: AccessFlags,
    /// Identity
    pub signature: Signature,
    /// Declared exceptions
    pub exceptions: Vec<String>,
}

/// Structural snapshot of a compiled class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetadata {
    /// Dotted class name
    pub name: String,
    /// Access flags
    pub access: AccessFlags,
    /// Superclass name
    pub super_name: Option<String>,
    /// Directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields as (name, type)
    pub fields: Vec<(String, TypeDescriptor)>,
    /// Declared methods and constructors
    pub methods: Vec<MemberInfo>,
}

impl ClassMetadata {
    /// Declared methods excluding constructors
    pub fn methods(&self) -> impl Iterator<Item = &MemberInfo> {
        self.methods.iter().filter(|m| !m.signature.is_constructor())
    }

    /// Declared constructors
    pub fn constructors(&self) -> impl Iterator<Item = &MemberInfo> {
        self.methods.iter().filter(|m| m.signature.is_constructor())
    }
}

#[derive(Default)]
struct MetadataVisitor {
    header: Option<ClassHeader>,
    fields: Vec<(String, TypeDescriptor)>,
    methods: Vec<MemberInfo>,
}

impl ClassVisitor for MetadataVisitor {
    fn visit(&mut self, header: &ClassHeader) -> ControlFlow<()> {
        self.header = Some(header.clone());
        ControlFlow::Continue(())
    }

    fn visit_field(&mut self, field: &FieldImage) -> ControlFlow<()> {
        self.fields.push((field.name.clone(), field.descriptor.clone()));
        ControlFlow::Continue(())
    }

    fn visit_method(&mut self, method: &MethodHeader) -> ControlFlow<(), MethodAction> {
        self.methods.push(MemberInfo {
            access: method.access,
            signature: method.signature.clone(),
            exceptions: method.exceptions.clone(),
        });
        ControlFlow::Continue(MethodAction::SkipBody)
    }
}

/// Read the metadata of an encoded image
pub fn read_metadata(bytes: &[u8]) -> WeaverResult<ClassMetadata> {
    let mut visitor = MetadataVisitor::default();
    ClassReader::new(bytes)?.accept(&mut visitor)?;
    let header = visitor.header.ok_or_else(|| {
        WeaverError::Image(weaver_image::ImageError::Decode(
            weaver_image::DecodeError::Malformed {
                offset: 0,
                message: "missing class header".to_string(),
            },
        ))
    })?;
    Ok(ClassMetadata {
        name: header.name,
        access: header.access,
        super_name: header.super_name,
        interfaces: header.interfaces,
        fields: visitor.fields,
        methods: visitor.methods,
    })
}

/// Read the metadata of `class_name` from `source`
pub fn read_class_metadata(
    source: &dyn ArtifactSource,
    class_name: &str,
) -> WeaverResult<ClassMetadata> {
    let bytes = source
        .artifact(class_name)
        .ok_or_else(|| WeaverError::MissingArtifact(class_name.to_string()))?;
    read_metadata(&bytes)
}

/// Read only the class name of an encoded image
pub fn read_class_name(bytes: &[u8]) -> WeaverResult<String> {
    Ok(weaver_image::read_class_name(bytes)?)
}
