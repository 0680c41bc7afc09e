//! Objects and object references

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use weaver_image::{Signature, TypeDescriptor};

use crate::callback::Callback;
use crate::error::{InvokeError, InvokeResult};
use crate::generated::GeneratedType;
use crate::runtime::class::RuntimeClass;
use crate::runtime::interpreter::run_method;
use crate::runtime::value::{Primitive, Value};

/// Heap object
pub struct Object {
    class: Arc<RuntimeClass>,
    fields: RwLock<FxHashMap<String, Value>>,
    callbacks: RwLock<Vec<Option<Arc<dyn Callback>>>>,
    generated: Option<Arc<GeneratedType>>,
}

/// Shared reference to an [`Object`]; equality is identity
#[derive(Clone)]
pub struct ObjectRef(Arc<Object>);

impl ObjectRef {
    /// Allocate an instance with default field values, without running a
    /// constructor
    pub(crate) fn allocate(class: Arc<RuntimeClass>, generated: Option<Arc<GeneratedType>>) -> Self {
        let mut fields = FxHashMap::default();
        let mut current = Some(&class);
        while let Some(c) = current {
            for (name, ty) in c.fields() {
                fields.entry(name.clone()).or_insert_with(|| default_value(ty));
            }
            current = c.superclass();
        }

        let slots = generated.as_ref().map(|g| g.slots().len()).unwrap_or(0);
        ObjectRef(Arc::new(Object {
            class,
            fields: RwLock::new(fields),
            callbacks: RwLock::new(vec![None; slots]),
            generated,
        }))
    }

    /// Runtime class
    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.0.class
    }

    /// Runtime class name
    pub fn class_name(&self) -> &str {
        self.0.class.name()
    }

    /// Generated type, for proxy instances
    pub fn generated_type(&self) -> Option<&Arc<GeneratedType>> {
        self.0.generated.as_ref()
    }

    /// Whether both references point to the same object
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    // ===== Fields =====

    /// Read a field (any class in the hierarchy)
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.0.fields.read().get(name).cloned()
    }

    /// Write a field
    pub fn set_field(&self, name: &str, value: Value) {
        self.0.fields.write().insert(name.to_string(), value);
    }

    // ===== Callback slots =====

    pub(crate) fn callback_slot(&self, index: usize) -> Option<Arc<dyn Callback>> {
        self.0.callbacks.read().get(index).cloned().flatten()
    }

    pub(crate) fn store_callback(&self, index: usize, callback: Option<Arc<dyn Callback>>) {
        if let Some(slot) = self.0.callbacks.write().get_mut(index) {
            *slot = callback;
        }
    }

    pub(crate) fn callback_slots(&self) -> Vec<Option<Arc<dyn Callback>>> {
        self.0.callbacks.read().clone()
    }

    // ===== Invocation =====

    /// Call a method by declaration (`"int add(int, int)"`) as an external caller
    pub fn call(&self, declaration: &str, args: &[Value]) -> InvokeResult<Value> {
        let signature = Signature::parse(declaration)?;
        self.invoke_from(None, &signature, args)
    }

    /// Virtual call as an external caller
    pub fn invoke(&self, signature: &Signature, args: &[Value]) -> InvokeResult<Value> {
        self.invoke_from(None, signature, args)
    }

    /// Virtual call on behalf of `caller`
    pub fn invoke_from(
        &self,
        caller: Option<&str>,
        signature: &Signature,
        args: &[Value],
    ) -> InvokeResult<Value> {
        let method = self
            .class()
            .lookup_virtual(signature)
            .cloned()
            .ok_or_else(|| InvokeError::NoSuchMethod {
                class: self.class_name().to_string(),
                signature: signature.to_string(),
            })?;
        run_method(&method, self, args, caller)
    }

    /// Non-virtual call of the implementation visible from class `owner`
    pub fn invoke_special(
        &self,
        caller: Option<&str>,
        owner: &str,
        signature: &Signature,
        args: &[Value],
    ) -> InvokeResult<Value> {
        let class = self
            .class()
            .find_ancestor(owner)
            .ok_or_else(|| InvokeError::ClassCast {
                from: self.class_name().to_string(),
                to: owner.to_string(),
            })?;
        let method = class
            .resolve_special(signature)
            .cloned()
            .ok_or_else(|| InvokeError::NoSuchMethod {
                class: owner.to_string(),
                signature: signature.to_string(),
            })?;
        run_method(&method, self, args, caller)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.class_name(), Arc::as_ptr(&self.0))
    }
}

fn default_value(ty: &TypeDescriptor) -> Value {
    match ty.primitive_kind().and_then(Primitive::zero) {
        Some(zero) => Value::Primitive(zero),
        None => Value::Null,
    }
}
