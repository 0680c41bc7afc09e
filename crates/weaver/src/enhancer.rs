//! Enhancer facade
//!
//! [`Enhancer`] collects the shape of a proxy (base class, interfaces,
//! callbacks, filter, naming) and produces instances. [`Proxy`] is the factory
//! view of an instance: it reads and swaps callbacks and creates siblings of
//! the same generated type.
//!
//! ```ignore
//! let loader = TypeLoader::new();
//! loader.define(ClassDefinition::new("pkg.Greeter").add_method(...))?;
//!
//! let greeter = Enhancer::new(&loader)
//!     .set_superclass("pkg.Greeter")
//!     .set_callback(interceptor(|_, proxy, _, args, method| method.invoke_super(proxy, args)))
//!     .create()?;
//! greeter.call("String greet(String)", &[Value::string("hi")])?;
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;
use weaver_image::Signature;

use crate::callback::{AllToFirst, Callback, CallbackFilter, CallbackKind};
use crate::config::WeaverConfig;
use crate::defaults::OBJECT_CLASS;
use crate::emit::proxy::generate;
use crate::error::{WeaverError, WeaverResult};
use crate::generated::GeneratedType;
use crate::key::GenerationKey;
use crate::naming::{DefaultNamingPolicy, NamingPolicy};
use crate::runtime::{ObjectRef, RuntimeClass, TypeLoader, Value};

/// Builder for proxy types and instances
pub struct Enhancer<'a> {
    loader: &'a TypeLoader,
    superclass: String,
    interfaces: Vec<String>,
    callbacks: Vec<Arc<dyn Callback>>,
    callback_kinds: Vec<CallbackKind>,
    filter: Option<Arc<dyn CallbackFilter>>,
    naming: Arc<dyn NamingPolicy>,
    use_cache: bool,
    use_factory: bool,
    intercept_during_construction: bool,
    config: WeaverConfig,
}

impl<'a> Enhancer<'a> {
    /// Enhancer generating into `loader`
    pub fn new(loader: &'a TypeLoader) -> Self {
        Self {
            loader,
            superclass: OBJECT_CLASS.to_string(),
            interfaces: Vec::new(),
            callbacks: Vec::new(),
            callback_kinds: Vec::new(),
            filter: None,
            naming: Arc::new(DefaultNamingPolicy),
            use_cache: true,
            use_factory: true,
            intercept_during_construction: true,
            config: WeaverConfig::from_env(),
        }
    }

    // ===== Configuration =====

    /// Class to extend. An interface is implemented by a proxy of the root
    /// class instead.
    pub fn set_superclass(mut self, name: &str) -> Self {
        self.superclass = name.to_string();
        self
    }

    /// Additional interfaces to implement
    pub fn set_interfaces(mut self, names: &[&str]) -> Self {
        self.interfaces = names.iter().map(|name| name.to_string()).collect();
        self
    }

    /// Single callback
    pub fn set_callback(self, callback: Arc<dyn Callback>) -> Self {
        self.set_callbacks(vec![callback])
    }

    /// One callback per slot
    pub fn set_callbacks(mut self, callbacks: Vec<Arc<dyn Callback>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Single slot kind, for [`create_class`](Self::create_class) without
    /// callbacks
    pub fn set_callback_type(self, kind: CallbackKind) -> Self {
        self.set_callback_types(vec![kind])
    }

    /// Slot kinds
    pub fn set_callback_types(mut self, kinds: Vec<CallbackKind>) -> Self {
        self.callback_kinds = kinds;
        self
    }

    /// Route methods to slots
    pub fn set_callback_filter(mut self, filter: Arc<dyn CallbackFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Name generated types
    pub fn set_naming_policy(mut self, naming: Arc<dyn NamingPolicy>) -> Self {
        self.naming = naming;
        self
    }

    /// Share generated types between equal requests (default `true`)
    pub fn set_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Implement the factory interface (default `true`)
    pub fn set_use_factory(mut self, use_factory: bool) -> Self {
        self.use_factory = use_factory;
        self
    }

    /// Intercept calls made by base constructors (default `true`)
    pub fn set_intercept_during_construction(mut self, intercept: bool) -> Self {
        self.intercept_during_construction = intercept;
        self
    }

    /// Replace the configuration read from the environment
    pub fn with_config(mut self, config: WeaverConfig) -> Self {
        self.config = config;
        self
    }

    // ===== Generation =====

    /// Generation key for the current configuration
    pub fn key(&self) -> WeaverResult<GenerationKey> {
        let kinds = if self.callback_kinds.is_empty() {
            if self.callbacks.is_empty() {
                return Err(WeaverError::MissingCallbacks);
            }
            CallbackKind::of_all(&self.callbacks)?
        } else {
            self.check_callbacks_against_kinds()?;
            self.callback_kinds.clone()
        };

        let filter = match &self.filter {
            Some(filter) => filter.clone(),
            None if kinds.len() > 1 => return Err(WeaverError::MissingCallbackFilter),
            None => Arc::new(AllToFirst) as Arc<dyn CallbackFilter>,
        };

        Ok(GenerationKey::new(
            &self.superclass,
            &self.interfaces,
            kinds,
            filter,
            self.naming.clone(),
        )
        .with_use_factory(self.use_factory)
        .with_intercept_during_construction(self.intercept_during_construction))
    }

    fn check_callbacks_against_kinds(&self) -> WeaverResult<()> {
        if self.callbacks.is_empty() {
            return Ok(());
        }
        if self.callbacks.len() != self.callback_kinds.len() {
            return Err(WeaverError::CallbackCountMismatch {
                expected: self.callback_kinds.len(),
                actual: self.callbacks.len(),
            });
        }
        for (index, (callback, expected)) in self.callbacks.iter().zip(&self.callback_kinds).enumerate() {
            let actual = CallbackKind::of(callback.as_ref())?;
            if actual != *expected {
                return Err(WeaverError::CallbackTypeMismatch {
                    index,
                    expected: *expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Generated type for the current configuration
    pub fn create_class(&self) -> WeaverResult<Arc<GeneratedType>> {
        let key = self.key()?;
        if self.use_cache {
            self.loader
                .cache()
                .get_or_generate(&key, || generate(self.loader, &key, &self.config))
        } else {
            generate(self.loader, &key, &self.config)
        }
    }

    /// Instance built with the no-argument constructor
    pub fn create(&self) -> WeaverResult<ObjectRef> {
        self.create_with("", &[])
    }

    /// Instance built with the constructor taking `params` (`"int, String"`)
    pub fn create_with(&self, params: &str, args: &[Value]) -> WeaverResult<ObjectRef> {
        if self.callbacks.is_empty() {
            return Err(WeaverError::MissingCallbacks);
        }
        let generated = self.create_class()?;
        let constructor = Signature::parse_constructor(params)?;
        let object = generated.instantiate(&constructor, args, &self.callbacks)?;
        debug!(class = generated.name(), "created proxy instance");
        Ok(object)
    }

    /// Proxy of `superclass` with a single callback and default settings
    pub fn create_proxy(
        loader: &TypeLoader,
        superclass: &str,
        callback: Arc<dyn Callback>,
    ) -> WeaverResult<ObjectRef> {
        Enhancer::new(loader)
            .set_superclass(superclass)
            .set_callback(callback)
            .create()
    }

    /// Whether `object` is an instance of a generated type
    pub fn is_enhanced(object: &ObjectRef) -> bool {
        object.generated_type().is_some()
    }

    /// Whether `class` was produced by the generator
    pub fn is_enhanced_class(class: &RuntimeClass) -> bool {
        class.is_generated()
    }
}

impl fmt::Debug for Enhancer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enhancer")
            .field("superclass", &self.superclass)
            .field("interfaces", &self.interfaces)
            .field("callbacks", &self.callbacks.len())
            .field("callback_kinds", &self.callback_kinds)
            .field("filter", &self.filter)
            .field("naming", &self.naming)
            .field("use_cache", &self.use_cache)
            .field("use_factory", &self.use_factory)
            .finish()
    }
}

// ===== Factory view =====

/// Factory view of a proxy instance
#[derive(Clone)]
pub struct Proxy {
    object: ObjectRef,
    generated: Arc<GeneratedType>,
}

impl Proxy {
    /// View `object` as a factory; fails for plain objects and for types
    /// generated without factory support
    pub fn from_object(object: ObjectRef) -> WeaverResult<Self> {
        let generated = object
            .generated_type()
            .cloned()
            .ok_or_else(|| WeaverError::NotEnhanced(object.class_name().to_string()))?;
        if !generated.is_factory() {
            return Err(WeaverError::NotAFactory(generated.name().to_string()));
        }
        Ok(Self { object, generated })
    }

    /// Underlying instance
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Generated type of the instance
    pub fn generated_type(&self) -> &Arc<GeneratedType> {
        &self.generated
    }

    /// Callback in slot `index`
    pub fn callback(&self, index: usize) -> WeaverResult<Option<Arc<dyn Callback>>> {
        self.check_index(index)?;
        Ok(self.object.callback_slot(index))
    }

    /// Replace the callback in slot `index`
    pub fn set_callback(&self, index: usize, callback: Arc<dyn Callback>) -> WeaverResult<()> {
        self.generated.check_kind(index, callback.as_ref())?;
        self.object.store_callback(index, Some(callback));
        Ok(())
    }

    /// Empty slot `index`; calls routed to it run the original
    pub fn clear_callback(&self, index: usize) -> WeaverResult<()> {
        self.check_index(index)?;
        self.object.store_callback(index, None);
        Ok(())
    }

    /// Replace every callback
    pub fn set_callbacks(&self, callbacks: &[Arc<dyn Callback>]) -> WeaverResult<()> {
        self.generated.validate_callbacks(callbacks)?;
        for (index, callback) in callbacks.iter().enumerate() {
            self.object.store_callback(index, Some(callback.clone()));
        }
        Ok(())
    }

    /// Current callbacks, one entry per slot
    pub fn callbacks(&self) -> Vec<Option<Arc<dyn Callback>>> {
        self.object.callback_slots()
    }

    /// New instance of the same type with the no-argument constructor
    pub fn new_instance(&self, callbacks: &[Arc<dyn Callback>]) -> WeaverResult<Proxy> {
        self.new_instance_with("", &[], callbacks)
    }

    /// New instance of a single-slot type
    pub fn new_instance_single(&self, callback: Arc<dyn Callback>) -> WeaverResult<Proxy> {
        if self.generated.slots().len() != 1 {
            return Err(WeaverError::CallbackCountMismatch {
                expected: self.generated.slots().len(),
                actual: 1,
            });
        }
        self.new_instance(&[callback])
    }

    /// New instance with the constructor taking `params`
    pub fn new_instance_with(
        &self,
        params: &str,
        args: &[Value],
        callbacks: &[Arc<dyn Callback>],
    ) -> WeaverResult<Proxy> {
        let constructor = Signature::parse_constructor(params)?;
        let object = self.generated.instantiate(&constructor, args, callbacks)?;
        Ok(Proxy {
            object,
            generated: self.generated.clone(),
        })
    }

    fn check_index(&self, index: usize) -> WeaverResult<()> {
        let slots = self.generated.slots().len();
        if index >= slots {
            return Err(WeaverError::CallbackIndexOutOfRange { index, slots });
        }
        Ok(())
    }
}

impl Deref for Proxy {
    type Target = ObjectRef;

    fn deref(&self) -> &ObjectRef {
        &self.object
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Proxy").field(&self.object).finish()
    }
}
