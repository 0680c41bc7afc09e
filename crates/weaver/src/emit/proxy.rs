//! Proxy type generation
//!
//! Emits, for one [`GenerationKey`]:
//!
//! - a callback field per slot (`WEAVER$CALLBACK_<n>`)
//! - a forwarding constructor per constructor visible on the base class
//! - per intercepted method, an access method (`WEAVER$<name>$<n>`) running
//!   the original implementation, and a final override that dispatches to
//!   the callback in its slot or, when the slot is empty, to the access
//!   method
//!
//! The image is verified, read back, optionally dumped, and defined in the
//! loader from its bytes.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::debug;
use weaver_image::{flags, verify_image, AccessFlags, InvokeKind, Signature, TypeDescriptor};

use crate::bridge::BridgeResolver;
use crate::config::WeaverConfig;
use crate::debug::DebugSink;
use crate::defaults::{access_method, callback_field, CALLBACK_TYPE, ENHANCER_SOURCE, FACTORY_INTERFACE};
use crate::emit::class_emitter::ClassEmitter;
use crate::emit::code_builder::CodeBuilder;
use crate::emit::dispatch::MethodProxy;
use crate::emit::plan::collect_methods;
use crate::error::{InvokeError, WeaverError, WeaverResult};
use crate::generated::{CallbackSlot, GeneratedType, InterceptedMethod};
use crate::key::GenerationKey;
use crate::metadata::{read_class_name, ArtifactSource, MethodRecord};
use crate::runtime::{RuntimeClass, TypeLoader};

/// Access flags removed from an original method's flags on its override
const OVERRIDE_STRIPPED: AccessFlags =
    AccessFlags(AccessFlags::ABSTRACT.0 | AccessFlags::NATIVE.0 | AccessFlags::SYNCHRONIZED.0);

/// A method chosen for interception, with its routing
struct Planned {
    record: MethodRecord,
    slot: usize,
    access: Signature,
    bridge_target: Option<Signature>,
}

/// Generate the type described by `key` in `loader`
#[tracing::instrument(level = "debug", skip_all, fields(superclass = key.superclass()))]
pub(crate) fn generate(
    loader: &TypeLoader,
    key: &GenerationKey,
    config: &WeaverConfig,
) -> WeaverResult<Arc<GeneratedType>> {
    let (superclass, interfaces) = resolve_types(loader, key)?;
    let constructors = visible_constructors(&superclass)?;

    let methods = collect_methods(loader, &superclass, &interfaces);
    let bridges = resolve_bridges(loader, &methods);
    let kinds = key.callback_kinds();

    let mut planned = Vec::with_capacity(methods.len());
    for (index, record) in methods.into_iter().enumerate() {
        let slot = key.filter().accept(&record);
        if slot >= kinds.len() {
            return Err(WeaverError::FilterIndexOutOfRange {
                method: record.signature.to_string(),
                index: slot,
                slots: kinds.len(),
            });
        }
        let access = Signature::new(
            access_method(record.signature.name(), index),
            record.signature.descriptor().clone(),
        );
        let bridge_target = bridges.get(&record.signature).cloned();
        planned.push(Planned {
            record,
            slot,
            access,
            bridge_target,
        });
    }

    let name = choose_name(loader, key, &superclass, &interfaces);
    let mut emitter = ClassEmitter::new(AccessFlags::PUBLIC, &name, superclass.name());
    if key.use_factory() {
        emitter.add_interface(FACTORY_INTERFACE);
    }
    for iface in &interfaces {
        emitter.add_interface(iface.name());
    }

    let slots: Vec<CallbackSlot> = kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| CallbackSlot {
            index,
            kind: *kind,
            field: callback_field(index),
        })
        .collect();
    for slot in &slots {
        emitter.declare_field(AccessFlags::PRIVATE, &slot.field, TypeDescriptor::object(CALLBACK_TYPE));
    }

    for ctor in &constructors {
        emit_constructor(&mut emitter, superclass.name(), ctor)?;
    }
    for (index, method) in planned.iter().enumerate() {
        emit_access_method(&mut emitter, superclass.name(), method)?;
        emit_override(&mut emitter, &name, index, method)?;
    }

    let image = emitter.finish(flags::GENERATED);
    verify_image(&image)?;
    let bytes = image.encode();
    let actual = read_class_name(&bytes)?;
    if actual != name {
        return Err(WeaverError::NameMismatch {
            expected: name,
            actual,
        });
    }
    if let Some(sink) = DebugSink::from_config(config) {
        sink.write(&name, &bytes);
    }

    let class = loader.define_generated(bytes)?;
    let artifact = loader
        .artifact(&name)
        .ok_or_else(|| WeaverError::MissingArtifact(name.clone()))?;
    let intercepted = bind_methods(loader, class.name_arc(), planned)?;

    debug!(
        class = %name,
        methods = intercepted.len(),
        slots = slots.len(),
        "generated proxy type"
    );
    let generated = Arc::new(GeneratedType::new(
        class,
        key.clone(),
        artifact,
        slots,
        intercepted,
        constructors,
    ));
    loader.register_generated(generated.clone());
    Ok(generated)
}

/// Base class and interfaces; an interface given as base becomes the first
/// interface of a root-class proxy
fn resolve_types(
    loader: &TypeLoader,
    key: &GenerationKey,
) -> WeaverResult<(Arc<RuntimeClass>, Vec<Arc<RuntimeClass>>)> {
    let mut superclass = loader.load(key.superclass())?;
    let mut interfaces = Vec::new();
    if superclass.is_interface() {
        interfaces.push(superclass);
        superclass = loader.load(crate::defaults::OBJECT_CLASS)?;
    }
    if superclass.is_final() {
        return Err(WeaverError::CannotSubclassFinal(superclass.name().to_string()));
    }
    for name in key.interfaces() {
        let iface = loader.load(name)?;
        if !iface.is_interface() {
            return Err(WeaverError::NotAnInterface(name.to_string()));
        }
        if !interfaces.iter().any(|i: &Arc<RuntimeClass>| i.name() == name) {
            interfaces.push(iface);
        }
    }
    Ok((superclass, interfaces))
}

fn visible_constructors(superclass: &RuntimeClass) -> WeaverResult<Vec<Signature>> {
    let ctors: Vec<Signature> = superclass
        .constructors()
        .filter(|ctor| !ctor.access.is_private())
        .map(|ctor| ctor.signature.clone())
        .collect();
    if ctors.is_empty() {
        return Err(WeaverError::NoVisibleConstructors(superclass.name().to_string()));
    }
    Ok(ctors)
}

fn resolve_bridges(loader: &TypeLoader, methods: &[MethodRecord]) -> FxHashMap<Signature, Signature> {
    let mut resolver = BridgeResolver::new(loader);
    for method in methods.iter().filter(|m| m.is_bridge()) {
        resolver.add_bridge(&method.owner, method.signature.clone());
    }
    if resolver.is_empty() {
        return FxHashMap::default();
    }
    resolver.resolve_all()
}

/// Name the type and reserve the name; a lost race re-runs naming
fn choose_name(
    loader: &TypeLoader,
    key: &GenerationKey,
    superclass: &RuntimeClass,
    interfaces: &[Arc<RuntimeClass>],
) -> String {
    let prefix = match interfaces.first() {
        Some(iface) if superclass.superclass().is_none() => iface.name(),
        _ => superclass.name(),
    };
    loop {
        let name = key
            .naming()
            .class_name(Some(prefix), ENHANCER_SOURCE, key, &|candidate| loader.is_defined(candidate));
        if loader.reserve_name(&name) {
            return name;
        }
        debug!(class = %name, "generated name taken concurrently, renaming");
    }
}

fn emit_constructor(emitter: &mut ClassEmitter, super_name: &str, ctor: &Signature) -> WeaverResult<()> {
    let mut code = CodeBuilder::new(ctor);
    code.load_this()?;
    code.load_args()?;
    code.invoke(InvokeKind::Special, super_name, ctor)?;
    code.return_value()?;
    emitter.add_method(AccessFlags::PUBLIC, ctor.clone(), Vec::new(), code.build()?)
}

/// The unconditional original call behind an intercepted method
fn emit_access_method(emitter: &mut ClassEmitter, super_name: &str, method: &Planned) -> WeaverResult<()> {
    let mut code = CodeBuilder::new(&method.access);
    match &method.bridge_target {
        Some(target) => {
            code.load_this()?;
            code.load_args_as(target.params())?;
            code.invoke(InvokeKind::Virtual, super_name, target)?;
            code.return_value()?;
        }
        None if method.record.is_abstract() => code.throw_abstract()?,
        None => {
            code.load_this()?;
            code.load_args()?;
            code.invoke(InvokeKind::Special, super_name, &method.record.signature)?;
            code.return_value()?;
        }
    }
    emitter.add_method(
        AccessFlags::FINAL | AccessFlags::SYNTHETIC,
        method.access.clone(),
        method.record.exceptions.clone(),
        code.build()?,
    )
}

/// Slot check, callback dispatch and fallback to the access method
fn emit_override(
    emitter: &mut ClassEmitter,
    class_name: &str,
    index: usize,
    method: &Planned,
) -> WeaverResult<()> {
    let signature = &method.record.signature;
    let mut code = CodeBuilder::new(signature);
    let fallback = code.new_label();

    code.load_callback(method.slot)?;
    code.dup()?;
    code.jump_if_null(fallback)?;
    code.invoke_callback(index)?;
    if signature.return_type().is_void() {
        code.pop()?;
    } else {
        code.coerce_return(signature.return_type().clone())?;
    }
    code.return_value()?;

    code.mark(fallback)?;
    code.pop()?;
    code.load_this()?;
    code.load_args()?;
    code.invoke(InvokeKind::Special, class_name, &method.access)?;
    code.return_value()?;

    let access = method.record.access.without(OVERRIDE_STRIPPED) | AccessFlags::FINAL;
    emitter.add_method(access, signature.clone(), method.record.exceptions.clone(), code.build()?)
}

/// Bind every intercepted method to its original, loading each declaring
/// class once
fn bind_methods(
    loader: &TypeLoader,
    class_name: &Arc<str>,
    planned: Vec<Planned>,
) -> WeaverResult<Vec<InterceptedMethod>> {
    let mut owners: FxHashMap<Arc<str>, Arc<RuntimeClass>> = FxHashMap::default();
    let mut bound = Vec::with_capacity(planned.len());
    for method in planned {
        let owner = match owners.get(&method.record.owner) {
            Some(owner) => owner.clone(),
            None => {
                let owner = loader.load(&method.record.owner)?;
                owners.insert(method.record.owner.clone(), owner.clone());
                owner
            }
        };
        if owner.declared_method(&method.record.signature).is_none() {
            return Err(WeaverError::Invoke(InvokeError::NoSuchMethod {
                class: owner.name().to_string(),
                signature: method.record.signature.to_string(),
            }));
        }
        let proxy = MethodProxy::new(
            class_name.clone(),
            method.record.signature.clone(),
            method.access.clone(),
        );
        bound.push(InterceptedMethod {
            record: method.record,
            slot: method.slot,
            access_method: method.access,
            proxy,
        });
    }
    Ok(bound)
}
