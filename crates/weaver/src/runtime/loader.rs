//! Type loader
//!
//! The owning context of classes and generated types. A loader holds:
//!
//! - linked runtime classes, by name
//! - the class image of every class it defined (its artifact store)
//! - the set of taken names, including names reserved for generation
//! - every generated type defined in it
//! - the proxy cache for types generated against it
//!
//! Registries only grow. A generated type lives as long as its loader, so
//! the cache's weak references stay valid until the loader is dropped.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use weaver_image::{
    flags, verify_image, AccessFlags, ClassImage, FieldImage, Insn, InvokeKind, MethodImage,
    Signature, TypeDescriptor,
};

use crate::cache::ProxyCache;
use crate::defaults::{FACTORY_INTERFACE, OBJECT_CLASS};
use crate::error::{WeaverError, WeaverResult};
use crate::generated::GeneratedType;
use crate::metadata::{read_class_metadata, ArtifactSource, ClassMetadata};
use crate::runtime::class::{
    BodySpec, ClassDefinition, MethodBody, MethodDef, MethodDefinition, NativeFn, RuntimeClass,
};
use crate::runtime::object::ObjectRef;
use crate::runtime::value::Value;

/// Owning context for classes and generated types
pub struct TypeLoader {
    classes: RwLock<FxHashMap<Arc<str>, Arc<RuntimeClass>>>,
    artifacts: RwLock<FxHashMap<Arc<str>, Arc<[u8]>>>,
    /// Defined and reserved names; also serializes definition
    names: Mutex<FxHashSet<Arc<str>>>,
    generated: RwLock<FxHashMap<Arc<str>, Arc<GeneratedType>>>,
    cache: ProxyCache,
}

impl TypeLoader {
    /// Create a loader holding only the root class and the factory interface
    pub fn new() -> Self {
        let loader = Self {
            classes: RwLock::new(FxHashMap::default()),
            artifacts: RwLock::new(FxHashMap::default()),
            names: Mutex::new(FxHashSet::default()),
            generated: RwLock::new(FxHashMap::default()),
            cache: ProxyCache::new(),
        };
        loader.bootstrap();
        loader
    }

    fn bootstrap(&self) {
        let root_name: Arc<str> = Arc::from(OBJECT_CLASS);
        let noop: NativeFn = Arc::new(|_| Ok(Value::Void));
        let init = Arc::new(MethodDef {
            owner: root_name.clone(),
            access: AccessFlags::PUBLIC,
            signature: Signature::constructor(Vec::new()),
            exceptions: Vec::new(),
            body: MethodBody::Native(noop),
        });
        let root = Arc::new(RuntimeClass::link(
            root_name.clone(),
            AccessFlags::PUBLIC,
            None,
            Vec::new(),
            Vec::new(),
            vec![init.clone()],
            false,
        ));
        let mut root_image = ClassImage::new(OBJECT_CLASS, None);
        root_image.methods.push(MethodImage {
            access: AccessFlags::PUBLIC | AccessFlags::NATIVE,
            signature: init.signature.clone(),
            exceptions: Vec::new(),
            code: None,
        });
        self.install(root, root_image.encode());

        let factory_name: Arc<str> = Arc::from(FACTORY_INTERFACE);
        let factory_access = AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
        let root = self.find(OBJECT_CLASS);
        let factory = Arc::new(RuntimeClass::link(
            factory_name,
            factory_access,
            root,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            false,
        ));
        let mut factory_image = ClassImage::new(FACTORY_INTERFACE, Some(OBJECT_CLASS.to_string()));
        factory_image.access = factory_access;
        self.install(factory, factory_image.encode());
    }

    fn install(&self, class: Arc<RuntimeClass>, artifact: Vec<u8>) {
        let name = class.name_arc().clone();
        self.names.lock().insert(name.clone());
        self.artifacts.write().insert(name.clone(), Arc::from(artifact));
        self.classes.write().insert(name, class);
    }

    // ===== Lookup =====

    /// Linked class by name
    pub fn find(&self, name: &str) -> Option<Arc<RuntimeClass>> {
        self.classes.read().get(name).cloned()
    }

    /// Linked class by name, or [`WeaverError::ClassNotFound`]
    pub fn load(&self, name: &str) -> WeaverResult<Arc<RuntimeClass>> {
        self.find(name)
            .ok_or_else(|| WeaverError::ClassNotFound(name.to_string()))
    }

    /// Generated type defined under `name`
    pub fn generated_type(&self, name: &str) -> Option<Arc<GeneratedType>> {
        self.generated.read().get(name).cloned()
    }

    /// Number of generated types defined in this loader
    pub fn generated_count(&self) -> usize {
        self.generated.read().len()
    }

    /// Whether `name` is defined or reserved in this loader
    pub fn is_defined(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    /// Reserve `name` for a type about to be generated. Returns `false` if
    /// the name is already taken.
    pub fn reserve_name(&self, name: &str) -> bool {
        self.names.lock().insert(Arc::from(name))
    }

    /// Metadata of a class defined in this loader
    pub fn metadata(&self, name: &str) -> WeaverResult<ClassMetadata> {
        read_class_metadata(self, name)
    }

    /// Proxy cache for types generated against this loader
    pub fn cache(&self) -> &ProxyCache {
        &self.cache
    }

    /// Number of classes defined, including the bootstrap classes
    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }

    // ===== Definition =====

    /// Link a class definition and store its image.
    ///
    /// The superclass and interfaces must already be defined.
    pub fn define(&self, definition: ClassDefinition) -> WeaverResult<Arc<RuntimeClass>> {
        let mut names = self.names.lock();
        if names.contains(definition.name.as_str()) {
            return Err(WeaverError::DuplicateClass(definition.name));
        }

        let is_interface = definition.access.is_interface();
        let superclass = self.load(&definition.super_name)?;
        if superclass.is_interface() {
            return Err(WeaverError::ExtendsInterface(superclass.name().to_string()));
        }
        if superclass.is_final() {
            return Err(WeaverError::CannotSubclassFinal(superclass.name().to_string()));
        }
        let interfaces = self.load_interfaces(&definition.interfaces)?;

        let name: Arc<str> = Arc::from(definition.name.as_str());
        let mut image = ClassImage::new(definition.name.as_str(), Some(definition.super_name.clone()));
        image.access = definition.access;
        image.interfaces = definition.interfaces.clone();

        let mut fields = Vec::with_capacity(definition.fields.len());
        for field in &definition.fields {
            let ty = TypeDescriptor::from_type_name(&field.type_name)?;
            image.fields.push(FieldImage {
                access: field.access,
                name: field.name.clone(),
                descriptor: ty.clone(),
            });
            fields.push((field.name.clone(), ty));
        }

        let mut declared: Vec<Arc<MethodDef>> = Vec::new();
        let mut seen = FxHashSet::default();
        let mut add = |method: MethodDef, image: &mut ClassImage| -> WeaverResult<()> {
            if !seen.insert(method.signature.clone()) {
                return Err(WeaverError::DuplicateMethod {
                    class: name.to_string(),
                    signature: method.signature.to_string(),
                });
            }
            image.methods.push(method_image(&method));
            declared.push(Arc::new(method));
            Ok(())
        };

        for method in &definition.methods {
            let linked = self.link_method(&name, &definition.super_name, method)?;
            add(linked, &mut image)?;
        }

        if definition.constructors.is_empty() && !is_interface {
            add(default_constructor(&name, &definition.super_name), &mut image)?;
        }
        for ctor in &definition.constructors {
            let params = weaver_image::Signature::parse_constructor(&ctor.params)?;
            add(
                MethodDef {
                    owner: name.clone(),
                    access: ctor.access,
                    signature: params,
                    exceptions: Vec::new(),
                    body: MethodBody::Native(ctor.body.clone()),
                },
                &mut image,
            )?;
        }

        verify_image(&image)?;

        let class = Arc::new(RuntimeClass::link(
            name.clone(),
            definition.access,
            Some(superclass),
            interfaces,
            fields,
            declared,
            false,
        ));
        let artifact: Arc<[u8]> = Arc::from(image.encode());

        names.insert(name.clone());
        self.artifacts.write().insert(name.clone(), artifact);
        self.classes.write().insert(name.clone(), class.clone());
        drop(names);

        debug!(class = %name, methods = class.declared_methods().len(), "defined class");
        Ok(class)
    }

    /// Define a generated type from its image bytes.
    ///
    /// The name must have been reserved with [`reserve_name`](Self::reserve_name).
    pub(crate) fn define_generated(&self, bytes: Vec<u8>) -> WeaverResult<Arc<RuntimeClass>> {
        let image = ClassImage::decode(&bytes)?;
        verify_image(&image)?;

        let superclass = self.load(image.super_name.as_deref().unwrap_or(OBJECT_CLASS))?;
        let interfaces = self.load_interfaces(&image.interfaces)?;

        let name: Arc<str> = Arc::from(image.name.as_str());
        if self.find(&name).is_some() {
            return Err(WeaverError::DuplicateClass(image.name));
        }

        let fields = image
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.descriptor.clone()))
            .collect();
        let declared = image
            .methods
            .iter()
            .map(|method| {
                Arc::new(MethodDef {
                    owner: name.clone(),
                    access: method.access,
                    signature: method.signature.clone(),
                    exceptions: method.exceptions.clone(),
                    body: match &method.code {
                        Some(code) => MethodBody::Code(Arc::from(code.as_slice())),
                        None => MethodBody::Abstract,
                    },
                })
            })
            .collect();

        let class = Arc::new(RuntimeClass::link(
            name.clone(),
            image.access,
            Some(superclass),
            interfaces,
            fields,
            declared,
            image.flags & flags::GENERATED != 0,
        ));

        self.names.lock().insert(name.clone());
        self.artifacts.write().insert(name.clone(), Arc::from(bytes));
        self.classes.write().insert(name.clone(), class.clone());

        debug!(class = %name, "defined generated class");
        Ok(class)
    }

    /// Keep `generated` alive for the lifetime of the loader
    pub(crate) fn register_generated(&self, generated: Arc<GeneratedType>) {
        let name = generated.class().name_arc().clone();
        self.generated.write().insert(name, generated);
    }

    fn load_interfaces(&self, names: &[String]) -> WeaverResult<Vec<Arc<RuntimeClass>>> {
        names
            .iter()
            .map(|name| {
                let iface = self.load(name)?;
                if iface.is_interface() {
                    Ok(iface)
                } else {
                    Err(WeaverError::NotAnInterface(name.clone()))
                }
            })
            .collect()
    }

    fn link_method(
        &self,
        owner: &Arc<str>,
        super_name: &str,
        definition: &MethodDefinition,
    ) -> WeaverResult<MethodDef> {
        let signature = Signature::parse(&definition.declaration)?;
        let mut access = definition.access;
        let body = match &definition.body {
            BodySpec::Native(body) => MethodBody::Native(body.clone()),
            BodySpec::Code(code) => MethodBody::Code(Arc::from(code.as_slice())),
            BodySpec::Abstract => {
                access |= AccessFlags::ABSTRACT;
                MethodBody::Abstract
            }
            BodySpec::Bridge { target } => {
                let target = Signature::parse(target)?;
                MethodBody::Code(Arc::from(delegating_code(&signature, owner, &target)))
            }
            BodySpec::SuperBridge => {
                MethodBody::Code(Arc::from(delegating_code(&signature, super_name, &signature)))
            }
        };
        Ok(MethodDef {
            owner: owner.clone(),
            access,
            signature,
            exceptions: definition.exceptions.clone(),
            body,
        })
    }

    // ===== Instances =====

    /// Create an instance of a plain class with the constructor taking
    /// `params` (e.g. `"int, String"`)
    pub fn new_instance(&self, class_name: &str, params: &str, args: &[Value]) -> WeaverResult<ObjectRef> {
        let class = self.load(class_name)?;
        if class.is_interface() || class.access().is_abstract() {
            return Err(WeaverError::NoMatchingConstructor {
                class: class_name.to_string(),
                signature: format!("abstract type {}", class_name),
            });
        }
        let ctor = Signature::parse_constructor(params)?;
        if class.declared_method(&ctor).is_none() {
            return Err(WeaverError::NoMatchingConstructor {
                class: class_name.to_string(),
                signature: ctor.to_string(),
            });
        }
        let object = ObjectRef::allocate(class, None);
        object.invoke_special(None, class_name, &ctor, args)?;
        Ok(object)
    }
}

impl Default for TypeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactSource for TypeLoader {
    fn artifact(&self, class_name: &str) -> Option<Arc<[u8]>> {
        self.artifacts.read().get(class_name).cloned()
    }
}

impl std::fmt::Debug for TypeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeLoader")
            .field("classes", &self.class_count())
            .field("generated", &self.generated_count())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Image form of a linked method; host closures appear as native methods
fn method_image(method: &MethodDef) -> MethodImage {
    let (access, code) = match &method.body {
        MethodBody::Native(_) => (method.access | AccessFlags::NATIVE, None),
        MethodBody::Code(code) => (method.access, Some(code.to_vec())),
        MethodBody::Abstract => (method.access | AccessFlags::ABSTRACT, None),
    };
    MethodImage {
        access,
        signature: method.signature.clone(),
        exceptions: method.exceptions.clone(),
        code,
    }
}

/// `this.<init>()` on the superclass
fn default_constructor(owner: &Arc<str>, super_name: &str) -> MethodDef {
    let signature = Signature::constructor(Vec::new());
    let code = vec![
        Insn::LoadThis,
        Insn::Invoke {
            kind: InvokeKind::Special,
            owner: super_name.to_string(),
            signature: signature.clone(),
        },
        Insn::ReturnVoid,
    ];
    MethodDef {
        owner: owner.clone(),
        access: AccessFlags::PUBLIC,
        signature,
        exceptions: Vec::new(),
        body: MethodBody::Code(Arc::from(code)),
    }
}

/// Body of a bridge: forward every argument to `target` on `owner` with a
/// non-virtual call, casting arguments whose declared types differ
fn delegating_code(signature: &Signature, owner: &str, target: &Signature) -> Vec<Insn> {
    let mut code = vec![Insn::LoadThis];
    for (index, param) in signature.params().iter().enumerate() {
        code.push(Insn::LoadArg(index as u16));
        if let Some(target_param) = target.params().get(index) {
            if target_param != param {
                code.push(Insn::Checkcast(target_param.clone()));
            }
        }
    }
    code.push(Insn::Invoke {
        kind: InvokeKind::Special,
        owner: owner.to_string(),
        signature: target.clone(),
    });
    code.push(if signature.return_type().is_void() {
        Insn::ReturnVoid
    } else {
        Insn::Return
    });
    code
}
