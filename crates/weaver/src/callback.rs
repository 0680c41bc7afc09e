//! Callback model
//!
//! A [`Callback`] is an opaque object installed in a proxy's callback slot.
//! What it can do is discovered through capability accessors rather than
//! downcasting; every callback must expose exactly one capability, which
//! determines its [`CallbackKind`]:
//!
//! | Kind                | Capability                 | Effect on an intercepted call      |
//! |---------------------|----------------------------|------------------------------------|
//! | `MethodInterceptor` | [`Callback::as_interceptor`] | full control, may call the original |
//! | `NoOp`              | [`Callback::is_no_op`]       | forwards to the original            |
//! | `FixedValue`        | [`Callback::as_fixed_value`] | returns a value, original not run   |
//!
//! [`CallbackFilter`]s route each intercepted method to a slot. Filters take
//! part in cache keys, so they must have value equality; [`DynKey`] provides
//! it for any `Eq + Hash` type.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::emit::dispatch::MethodProxy;
use crate::error::{InvokeResult, WeaverError, WeaverResult};
use crate::metadata::MethodRecord;
use crate::runtime::{ObjectRef, Value};

// ===== Kinds =====

/// Recognized callback capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallbackKind {
    /// Receives every intercepted call
    MethodInterceptor,
    /// Lets the original implementation run
    NoOp,
    /// Replaces the result with a fixed value
    FixedValue,
}

impl CallbackKind {
    /// Kind of a callback instance
    pub fn of(callback: &dyn Callback) -> WeaverResult<CallbackKind> {
        let mut kinds = Vec::with_capacity(1);
        if callback.as_interceptor().is_some() {
            kinds.push(CallbackKind::MethodInterceptor);
        }
        if callback.is_no_op() {
            kinds.push(CallbackKind::NoOp);
        }
        if callback.as_fixed_value().is_some() {
            kinds.push(CallbackKind::FixedValue);
        }

        match kinds.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(WeaverError::UnknownCallbackKind(
                callback.type_name().to_string(),
            )),
            _ => Err(WeaverError::AmbiguousCallbackKind {
                type_name: callback.type_name().to_string(),
                kinds,
            }),
        }
    }

    /// Kinds of a callback list, in order
    pub fn of_all(callbacks: &[Arc<dyn Callback>]) -> WeaverResult<Vec<CallbackKind>> {
        callbacks
            .iter()
            .map(|callback| CallbackKind::of(callback.as_ref()))
            .collect()
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            CallbackKind::MethodInterceptor => "MethodInterceptor",
            CallbackKind::NoOp => "NoOp",
            CallbackKind::FixedValue => "FixedValue",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ===== Capabilities =====

/// An object that can occupy a callback slot
pub trait Callback: Send + Sync + 'static {
    /// Interceptor capability
    fn as_interceptor(&self) -> Option<&dyn MethodInterceptor> {
        None
    }

    /// Fixed-value capability
    fn as_fixed_value(&self) -> Option<&dyn FixedValue> {
        None
    }

    /// Whether this callback only forwards to the original
    fn is_no_op(&self) -> bool {
        false
    }

    /// Name used in error messages
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Full interception of a method call
pub trait MethodInterceptor: Send + Sync {
    /// Handle one call.
    ///
    /// - `caller`: declaring class of the calling method, `None` for calls
    ///   from outside any method body
    /// - `proxy`: the receiving proxy instance
    /// - `method`: the intercepted method as declared on the base type
    /// - `args`: arguments, primitives boxed
    /// - `method_proxy`: handle that runs the original implementation
    ///
    /// The result is converted to the method's return type: primitives are
    /// unboxed with null becoming zero, references are type-checked, and the
    /// result of a `void` method is discarded.
    fn intercept(
        &self,
        caller: Option<&str>,
        proxy: &ObjectRef,
        method: &MethodRecord,
        args: &[Value],
        method_proxy: &MethodProxy,
    ) -> InvokeResult<Value>;
}

/// Result replacement
pub trait FixedValue: Send + Sync {
    /// Value returned by every method routed to this callback
    fn load_object(&self) -> InvokeResult<Value>;
}

// ===== Adapters =====

type InterceptFn = dyn Fn(Option<&str>, &ObjectRef, &MethodRecord, &[Value], &MethodProxy) -> InvokeResult<Value>
    + Send
    + Sync;

/// Interceptor backed by a closure
pub struct InterceptorFn(Box<InterceptFn>);

impl MethodInterceptor for InterceptorFn {
    fn intercept(
        &self,
        caller: Option<&str>,
        proxy: &ObjectRef,
        method: &MethodRecord,
        args: &[Value],
        method_proxy: &MethodProxy,
    ) -> InvokeResult<Value> {
        (self.0)(caller, proxy, method, args, method_proxy)
    }
}

impl Callback for InterceptorFn {
    fn as_interceptor(&self) -> Option<&dyn MethodInterceptor> {
        Some(self)
    }

    fn type_name(&self) -> &'static str {
        "InterceptorFn"
    }
}

/// Wrap a closure as a [`MethodInterceptor`] callback
pub fn interceptor<F>(f: F) -> Arc<dyn Callback>
where
    F: Fn(Option<&str>, &ObjectRef, &MethodRecord, &[Value], &MethodProxy) -> InvokeResult<Value>
        + Send
        + Sync
        + 'static,
{
    Arc::new(InterceptorFn(Box::new(f)))
}

/// Callback returning the same value for every call
#[derive(Debug, Clone)]
pub struct FixedValueCallback(pub Value);

impl FixedValue for FixedValueCallback {
    fn load_object(&self) -> InvokeResult<Value> {
        Ok(self.0.clone())
    }
}

impl Callback for FixedValueCallback {
    fn as_fixed_value(&self) -> Option<&dyn FixedValue> {
        Some(self)
    }

    fn type_name(&self) -> &'static str {
        "FixedValue"
    }
}

/// Fixed-value callback for `value`
pub fn fixed_value(value: impl Into<Value>) -> Arc<dyn Callback> {
    Arc::new(FixedValueCallback(value.into()))
}

/// Callback that lets the original run
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl Callback for NoOp {
    fn is_no_op(&self) -> bool {
        true
    }

    fn type_name(&self) -> &'static str {
        "NoOp"
    }
}

/// Shared [`NoOp`] callback
pub fn no_op() -> Arc<dyn Callback> {
    Arc::new(NoOp)
}

// ===== Filters =====

/// Value equality and hashing for trait objects
///
/// Implemented for every `Eq + Hash` type; two keys are equal only if they
/// have the same concrete type and compare equal.
pub trait DynKey: Send + Sync + 'static {
    /// Upcast for downcasting in [`dyn_eq`](DynKey::dyn_eq)
    fn as_any(&self) -> &dyn Any;

    /// Equality against another key
    fn dyn_eq(&self, other: &dyn Any) -> bool;

    /// Feed type and value into `state`
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T> DynKey for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        std::any::type_name::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Routes each intercepted method to a callback slot
pub trait CallbackFilter: DynKey + fmt::Debug {
    /// Slot index for `method`
    fn accept(&self, method: &MethodRecord) -> usize;
}

/// Sends every method to slot 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AllToFirst;

impl CallbackFilter for AllToFirst {
    fn accept(&self, _method: &MethodRecord) -> usize {
        0
    }
}

/// Routes methods by name, with a default slot for the rest
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RouteByName {
    routes: BTreeMap<String, usize>,
    default: usize,
}

impl RouteByName {
    /// Filter sending unmatched methods to `default`
    pub fn new(default: usize) -> Self {
        Self {
            routes: BTreeMap::new(),
            default,
        }
    }

    /// Send methods named `name` to `index`
    pub fn route(mut self, name: &str, index: usize) -> Self {
        self.routes.insert(name.to_string(), index);
        self
    }
}

impl CallbackFilter for RouteByName {
    fn accept(&self, method: &MethodRecord) -> usize {
        self.routes
            .get(method.name())
            .copied()
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHasher;
    use weaver_image::{AccessFlags, Signature};

    struct Confused(FixedValueCallback);

    impl Callback for Confused {
        fn is_no_op(&self) -> bool {
            true
        }

        fn as_fixed_value(&self) -> Option<&dyn FixedValue> {
            Some(&self.0)
        }
    }

    struct Inert;

    impl Callback for Inert {}

    fn record(name: &str) -> MethodRecord {
        MethodRecord {
            owner: Arc::from("pkg.Base"),
            signature: Signature::parse(&format!("void {}()", name)).unwrap(),
            access: AccessFlags::PUBLIC,
            exceptions: Vec::new(),
        }
    }

    fn hash_of(key: &dyn CallbackFilter) -> u64 {
        let mut hasher = FxHasher::default();
        key.dyn_hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_kind_of_adapters() {
        assert_eq!(CallbackKind::of(no_op().as_ref()).unwrap(), CallbackKind::NoOp);
        assert_eq!(
            CallbackKind::of(fixed_value(3).as_ref()).unwrap(),
            CallbackKind::FixedValue
        );
        let cb = interceptor(|_, _, _, _, _| Ok(Value::Null));
        assert_eq!(
            CallbackKind::of(cb.as_ref()).unwrap(),
            CallbackKind::MethodInterceptor
        );
    }

    #[test]
    fn test_unknown_kind() {
        let err = CallbackKind::of(&Inert).unwrap_err();
        assert!(matches!(err, WeaverError::UnknownCallbackKind(name) if name.ends_with("Inert")));
    }

    #[test]
    fn test_ambiguous_kind() {
        let err = CallbackKind::of(&Confused(FixedValueCallback(Value::Null))).unwrap_err();
        match err {
            WeaverError::AmbiguousCallbackKind { kinds, .. } => {
                assert_eq!(kinds, vec![CallbackKind::NoOp, CallbackKind::FixedValue]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_route_by_name() {
        let filter = RouteByName::new(0).route("add", 1);
        assert_eq!(filter.accept(&record("add")), 1);
        assert_eq!(filter.accept(&record("greet")), 0);
        assert_eq!(AllToFirst.accept(&record("add")), 0);
    }

    #[test]
    fn test_filter_equality() {
        let a: Arc<dyn CallbackFilter> = Arc::new(RouteByName::new(0).route("add", 1));
        let b: Arc<dyn CallbackFilter> = Arc::new(RouteByName::new(0).route("add", 1));
        let c: Arc<dyn CallbackFilter> = Arc::new(RouteByName::new(1));
        let d: Arc<dyn CallbackFilter> = Arc::new(AllToFirst);

        assert!(a.as_ref().dyn_eq(b.as_ref().as_any()));
        assert!(!a.as_ref().dyn_eq(c.as_ref().as_any()));
        assert!(!a.as_ref().dyn_eq(d.as_ref().as_any()));
        assert_eq!(hash_of(a.as_ref()), hash_of(b.as_ref()));
    }
}
