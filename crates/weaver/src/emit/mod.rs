//! Class emission
//!
//! - [`CodeBuilder`]: method bodies with labels and stack tracking
//! - [`ClassEmitter`]: assembles fields and methods into a class image
//! - `plan`: selects the methods a proxy overrides
//! - `proxy`: generates a proxy type for a generation key
//! - [`MethodProxy`]: handle to an intercepted method's original

pub mod class_emitter;
pub mod code_builder;
pub(crate) mod dispatch;
pub(crate) mod plan;
pub(crate) mod proxy;

pub use class_emitter::ClassEmitter;
pub use code_builder::{CodeBuilder, Label};
pub use dispatch::MethodProxy;
