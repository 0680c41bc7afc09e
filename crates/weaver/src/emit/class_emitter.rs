//! Assembles a class image member by member

use rustc_hash::FxHashSet;
use weaver_image::{AccessFlags, ClassImage, FieldImage, Insn, MethodImage, Signature, TypeDescriptor};

use crate::error::{WeaverError, WeaverResult};

/// Emits one class image
#[derive(Debug)]
pub struct ClassEmitter {
    image: ClassImage,
    signatures: FxHashSet<Signature>,
}

impl ClassEmitter {
    /// Start a class `name` extending `super_name`
    pub fn new(access: AccessFlags, name: &str, super_name: &str) -> Self {
        let mut image = ClassImage::new(name, Some(super_name.to_string()));
        image.access = access;
        Self {
            image,
            signatures: FxHashSet::default(),
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.image.name
    }

    /// Add an implemented interface (duplicates are ignored)
    pub fn add_interface(&mut self, name: &str) {
        if !self.image.interfaces.iter().any(|iface| iface == name) {
            self.image.interfaces.push(name.to_string());
        }
    }

    /// Declare a field
    pub fn declare_field(&mut self, access: AccessFlags, name: &str, ty: TypeDescriptor) {
        self.image.fields.push(FieldImage {
            access,
            name: name.to_string(),
            descriptor: ty,
        });
    }

    /// Add a method with a body
    pub fn add_method(
        &mut self,
        access: AccessFlags,
        signature: Signature,
        exceptions: Vec<String>,
        code: Vec<Insn>,
    ) -> WeaverResult<()> {
        if !self.signatures.insert(signature.clone()) {
            return Err(WeaverError::DuplicateMethod {
                class: self.image.name.clone(),
                signature: signature.to_string(),
            });
        }
        self.image.methods.push(MethodImage {
            access,
            signature,
            exceptions,
            code: Some(code),
        });
        Ok(())
    }

    /// Finish with the given image flags
    pub fn finish(mut self, flags: u32) -> ClassImage {
        self.image.flags = flags;
        self.image
    }
}
