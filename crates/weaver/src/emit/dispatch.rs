//! Callback dispatch
//!
//! The override emitted for each intercepted method loads its callback slot
//! and, if the slot is filled, hands the call to [`dispatch_callback`]. What
//! happens next depends on the kind declared for the slot.

use std::fmt;
use std::sync::Arc;

use weaver_image::Signature;

use crate::callback::{Callback, CallbackKind};
use crate::error::{InvokeError, InvokeResult};
use crate::generated::GeneratedType;
use crate::runtime::{unbox_args, ObjectRef, Value};

/// Arguments handed to interceptors of methods without parameters
const EMPTY_ARGS: &[Value] = &[];

/// Run the callback installed for intercepted method `index`
pub(crate) fn dispatch_callback(
    generated: &GeneratedType,
    index: usize,
    callback: &Arc<dyn Callback>,
    this: &ObjectRef,
    args: &[Value],
    caller: Option<&str>,
) -> InvokeResult<Value> {
    let method = generated.methods().get(index).ok_or_else(|| {
        InvokeError::IllegalState(format!("{} has no intercepted method {}", generated.name(), index))
    })?;
    let kind = generated
        .slots()
        .get(method.slot)
        .map(|slot| slot.kind)
        .ok_or_else(|| InvokeError::IllegalState(format!("missing callback slot {}", method.slot)))?;

    match kind {
        CallbackKind::MethodInterceptor => {
            let interceptor = callback
                .as_interceptor()
                .ok_or_else(|| slot_mismatch(method.slot, kind))?;
            if args.is_empty() {
                interceptor.intercept(caller, this, &method.record, EMPTY_ARGS, &method.proxy)
            } else {
                let boxed: Vec<Value> = args.iter().cloned().map(Value::boxed).collect();
                interceptor.intercept(caller, this, &method.record, &boxed, &method.proxy)
            }
        }
        CallbackKind::FixedValue => callback
            .as_fixed_value()
            .ok_or_else(|| slot_mismatch(method.slot, kind))?
            .load_object(),
        CallbackKind::NoOp => method.proxy.invoke_super(this, args),
    }
}

fn slot_mismatch(slot: usize, kind: CallbackKind) -> InvokeError {
    InvokeError::IllegalState(format!("callback in slot {} is not a {}", slot, kind))
}

/// Handle to the original implementation of an intercepted method
///
/// Handed to interceptors; it can be cloned and kept beyond the call.
#[derive(Clone)]
pub struct MethodProxy {
    inner: Arc<MethodProxyInner>,
}

struct MethodProxyInner {
    class_name: Arc<str>,
    signature: Signature,
    super_signature: Signature,
}

impl MethodProxy {
    pub(crate) fn new(class_name: Arc<str>, signature: Signature, super_signature: Signature) -> Self {
        Self {
            inner: Arc::new(MethodProxyInner {
                class_name,
                signature,
                super_signature,
            }),
        }
    }

    /// Signature of the intercepted method
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// Signature of the access method that runs the original
    pub fn super_signature(&self) -> &Signature {
        &self.inner.super_signature
    }

    /// Name of the access method, e.g. `WEAVER$add$1`
    pub fn super_name(&self) -> &str {
        self.inner.super_signature.name()
    }

    /// Generated class the handle belongs to
    pub fn class_name(&self) -> &str {
        &self.inner.class_name
    }

    /// Run the original implementation on `obj`, bypassing its callbacks.
    ///
    /// Arguments may be boxed; the result is boxed.
    pub fn invoke_super(&self, obj: &ObjectRef, args: &[Value]) -> InvokeResult<Value> {
        let args = self.prepare(args)?;
        let class_name = &*self.inner.class_name;
        obj.invoke_special(Some(class_name), class_name, &self.inner.super_signature, &args)
            .map(Value::boxed)
    }

    /// Call the method virtually on `obj`; interception applies if `obj`
    /// is a proxy.
    ///
    /// Arguments may be boxed; the result is boxed.
    pub fn invoke(&self, obj: &ObjectRef, args: &[Value]) -> InvokeResult<Value> {
        let args = self.prepare(args)?;
        obj.invoke_from(Some(&self.inner.class_name), &self.inner.signature, &args)
            .map(Value::boxed)
    }

    fn prepare(&self, args: &[Value]) -> InvokeResult<Vec<Value>> {
        let params = self.inner.signature.params();
        if args.len() != params.len() {
            return Err(InvokeError::ArgumentCount {
                signature: self.inner.signature.to_string(),
                expected: params.len(),
                actual: args.len(),
            });
        }
        unbox_args(args, params)
    }
}

impl fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MethodProxy({}.{} -> {})",
            self.inner.class_name, self.inner.signature, self.inner.super_signature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_proxy_accessors() {
        let sig = Signature::parse("int add(int, int)").unwrap();
        let access = Signature::parse("int WEAVER$add$1(int, int)").unwrap();
        let proxy = MethodProxy::new(Arc::from("pkg.Gen"), sig.clone(), access);

        let copy = proxy.clone();
        assert_eq!(copy.signature(), &sig);
        assert_eq!(copy.super_name(), "WEAVER$add$1");
        assert_eq!(copy.class_name(), "pkg.Gen");
        assert_eq!(format!("{:?}", copy), "MethodProxy(pkg.Gen.add(II)I -> WEAVER$add$1(II)I)");
    }

    #[test]
    fn test_method_proxy_is_static() {
        fn assert_static<T: Send + Sync + 'static>() {}
        assert_static::<MethodProxy>();
    }
}
