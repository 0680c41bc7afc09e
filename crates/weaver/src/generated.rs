//! Generated types
//!
//! A [`GeneratedType`] pairs the linked class of a proxy with everything the
//! dispatch path needs at run time: the declared kind of each callback slot,
//! the intercepted methods with their forwarding handles, and a lookup table
//! from signature strings to handles.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use weaver_image::Signature;

use crate::callback::{Callback, CallbackKind};
use crate::emit::dispatch::MethodProxy;
use crate::error::{WeaverError, WeaverResult};
use crate::key::GenerationKey;
use crate::metadata::MethodRecord;
use crate::runtime::{ObjectRef, RuntimeClass, Value};

/// A callback slot of a generated type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSlot {
    /// Slot index
    pub index: usize,
    /// Kind every callback in this slot must have
    pub kind: CallbackKind,
    /// Backing field name
    pub field: String,
}

/// A method overridden by a generated type
#[derive(Debug, Clone)]
pub struct InterceptedMethod {
    /// The method as declared on the base type
    pub record: MethodRecord,
    /// Callback slot it is routed to
    pub slot: usize,
    /// Access method running the original implementation
    pub access_method: Signature,
    /// Handle given to interceptors
    pub proxy: MethodProxy,
}

/// A synthesized proxy type
pub struct GeneratedType {
    class: Arc<RuntimeClass>,
    key: GenerationKey,
    artifact: Arc<[u8]>,
    fingerprint: String,
    slots: Vec<CallbackSlot>,
    methods: Vec<InterceptedMethod>,
    by_access: FxHashMap<Signature, usize>,
    /// Method index by string hash of the signature key
    lookup: FxHashMap<i32, Vec<usize>>,
    constructors: Vec<Signature>,
}

impl GeneratedType {
    pub(crate) fn new(
        class: Arc<RuntimeClass>,
        key: GenerationKey,
        artifact: Arc<[u8]>,
        slots: Vec<CallbackSlot>,
        methods: Vec<InterceptedMethod>,
        constructors: Vec<Signature>,
    ) -> Self {
        let by_access = methods
            .iter()
            .enumerate()
            .map(|(index, method)| (method.access_method.clone(), index))
            .collect();
        let mut lookup: FxHashMap<i32, Vec<usize>> = FxHashMap::default();
        for (index, method) in methods.iter().enumerate() {
            lookup
                .entry(string_hash(&method.record.signature.key()))
                .or_default()
                .push(index);
        }

        Self {
            fingerprint: weaver_image::fingerprint(&artifact),
            class,
            key,
            artifact,
            slots,
            methods,
            by_access,
            lookup,
            constructors,
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        self.class.name()
    }

    /// Linked class
    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.class
    }

    /// Base class
    pub fn superclass(&self) -> Option<&Arc<RuntimeClass>> {
        self.class.superclass()
    }

    /// Key this type was generated for
    pub fn key(&self) -> &GenerationKey {
        &self.key
    }

    /// Encoded class image
    pub fn artifact(&self) -> &Arc<[u8]> {
        &self.artifact
    }

    /// SHA-256 of the class image, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Callback slots
    pub fn slots(&self) -> &[CallbackSlot] {
        &self.slots
    }

    /// Intercepted methods, in emission order
    pub fn methods(&self) -> &[InterceptedMethod] {
        &self.methods
    }

    /// Forwarding constructors
    pub fn constructors(&self) -> &[Signature] {
        &self.constructors
    }

    /// Whether instances act as factories
    pub fn is_factory(&self) -> bool {
        self.key.use_factory()
    }

    /// Intercepted method whose original is run by `access_method`
    pub fn method_for_access(&self, access_method: &Signature) -> Option<&InterceptedMethod> {
        self.by_access
            .get(access_method)
            .map(|&index| &self.methods[index])
    }

    /// Intercepted method by original signature
    pub fn intercepted(&self, signature: &Signature) -> Option<&InterceptedMethod> {
        self.find(&signature.key())
    }

    /// Forwarding handle for a signature key such as `add(II)I`
    pub fn find_method_proxy(&self, key: &str) -> Option<&MethodProxy> {
        self.find(key).map(|method| &method.proxy)
    }

    fn find(&self, key: &str) -> Option<&InterceptedMethod> {
        self.lookup
            .get(&string_hash(key))?
            .iter()
            .map(|&index| &self.methods[index])
            .find(|method| method.record.signature.key() == key)
    }

    /// Check that `callbacks` fit the slots one to one
    pub fn validate_callbacks(&self, callbacks: &[Arc<dyn Callback>]) -> WeaverResult<()> {
        if callbacks.len() != self.slots.len() {
            return Err(WeaverError::CallbackCountMismatch {
                expected: self.slots.len(),
                actual: callbacks.len(),
            });
        }
        for (slot, callback) in self.slots.iter().zip(callbacks) {
            self.check_kind(slot.index, callback.as_ref())?;
        }
        Ok(())
    }

    pub(crate) fn check_kind(&self, index: usize, callback: &dyn Callback) -> WeaverResult<()> {
        let slot = self
            .slots
            .get(index)
            .ok_or(WeaverError::CallbackIndexOutOfRange {
                index,
                slots: self.slots.len(),
            })?;
        let actual = CallbackKind::of(callback)?;
        if actual != slot.kind {
            return Err(WeaverError::CallbackTypeMismatch {
                index,
                expected: slot.kind,
                actual,
            });
        }
        Ok(())
    }

    /// Allocate an instance, install `callbacks` and run the forwarding
    /// constructor `constructor`.
    ///
    /// Callbacks are installed before the constructor runs when the type
    /// intercepts during construction, after it otherwise.
    pub(crate) fn instantiate(
        self: &Arc<Self>,
        constructor: &Signature,
        args: &[Value],
        callbacks: &[Arc<dyn Callback>],
    ) -> WeaverResult<ObjectRef> {
        if !self.constructors.contains(constructor) {
            return Err(WeaverError::NoMatchingConstructor {
                class: self.name().to_string(),
                signature: constructor.to_string(),
            });
        }
        self.validate_callbacks(callbacks)?;

        let object = ObjectRef::allocate(self.class.clone(), Some(self.clone()));
        let early = self.key.intercept_during_construction();
        if early {
            install(&object, callbacks);
        }
        object.invoke_special(None, self.name(), constructor, args)?;
        if !early {
            install(&object, callbacks);
        }
        Ok(object)
    }
}

fn install(object: &ObjectRef, callbacks: &[Arc<dyn Callback>]) {
    for (index, callback) in callbacks.iter().enumerate() {
        object.store_callback(index, Some(callback.clone()));
    }
}

impl fmt::Debug for GeneratedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedType")
            .field("name", &self.name())
            .field("slots", &self.slots)
            .field("methods", &self.methods.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// 32-bit polynomial string hash over UTF-16 units (`h = 31 * h + c`)
pub(crate) fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}
