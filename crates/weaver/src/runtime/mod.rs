//! Runtime object model
//!
//! Values, objects, linked classes, the loader that owns them and the
//! interpreter for code bodies.

pub mod class;
pub mod convert;
pub(crate) mod interpreter;
pub mod loader;
pub mod object;
pub mod value;

pub use class::{
    CallContext, ClassDefinition, ConstructorDefinition, FieldDefinition, MethodBody, MethodDef,
    MethodDefinition, NativeFn, RuntimeClass,
};
pub use convert::{checkcast, coerce_return, unbox_args};
pub use loader::TypeLoader;
pub use object::ObjectRef;
pub use value::{Primitive, Value};
