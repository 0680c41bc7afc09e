//! Weaver
//!
//! Runtime subclass proxies with callback interception:
//! - **Runtime**: loader, linked classes, objects and the code interpreter (`runtime` module)
//! - **Generation**: method selection, bridge resolution, naming and emission (`emit` module)
//! - **Dispatch**: callback kinds, filters and method handles (`callback` module)
//! - **Facade**: the [`Enhancer`] builder and the [`Proxy`] factory view
//!
//! # Example
//!
//! ```rust,ignore
//! use weaver::{interceptor, ClassDefinition, Enhancer, MethodDefinition, TypeLoader, Value};
//!
//! let loader = TypeLoader::new();
//! loader.define(
//!     ClassDefinition::new("demo.Calculator")
//!         .add_method(MethodDefinition::new("int add(int, int)", |ctx| {
//!             Ok(Value::int(ctx.int_arg(0)? + ctx.int_arg(1)?))
//!         })),
//! )?;
//!
//! let calc = Enhancer::new(&loader)
//!     .set_superclass("demo.Calculator")
//!     .set_callback(interceptor(|_, proxy, _, args, method| {
//!         let sum = method.invoke_super(proxy, args)?;
//!         Ok(Value::int(sum.as_int().unwrap_or(0) + 1))
//!     }))
//!     .create()?;
//! assert_eq!(calc.call("int add(int, int)", &[Value::int(2), Value::int(3)])?, Value::int(6));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Runtime object model: loader, classes, objects, interpreter
pub mod runtime;

/// Class emission and proxy generation
pub mod emit;

/// Callback kinds, capabilities and filters
pub mod callback;

// ============================================================================
// Generation support
// ============================================================================

pub mod bridge;
pub mod cache;
pub mod config;
pub mod debug;
pub mod defaults;
pub mod enhancer;
pub mod error;
pub mod generated;
pub mod key;
pub mod metadata;
pub mod naming;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::BridgeResolver;
pub use cache::{CacheStats, ProxyCache};
pub use callback::{
    fixed_value, interceptor, no_op, AllToFirst, Callback, CallbackFilter, CallbackKind, DynKey,
    FixedValue, FixedValueCallback, MethodInterceptor, NoOp, RouteByName,
};
pub use config::WeaverConfig;
pub use debug::DebugSink;
pub use emit::MethodProxy;
pub use enhancer::{Enhancer, Proxy};
pub use error::{InvokeError, InvokeResult, Throwable, WeaverError, WeaverResult};
pub use generated::{CallbackSlot, GeneratedType, InterceptedMethod};
pub use key::GenerationKey;
pub use metadata::{ArtifactSource, ClassMetadata, MemberInfo, MethodRecord};
pub use naming::{DefaultNamingPolicy, NamingPolicy};
pub use runtime::{
    CallContext, ClassDefinition, ConstructorDefinition, FieldDefinition, MethodDefinition, ObjectRef,
    Primitive, RuntimeClass, TypeLoader, Value,
};
pub use weaver_image::{Signature, TypeDescriptor};
