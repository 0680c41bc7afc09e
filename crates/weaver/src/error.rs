//! Error types
//!
//! Two families:
//!
//! - [`WeaverError`]: configuration and generation failures, raised before a
//!   proxy exists. A failed generation is never cached.
//! - [`InvokeError`]: failures while running methods. User failures travel as
//!   [`InvokeError::Thrown`] and are never rewritten on their way to the caller.

use std::fmt;

use thiserror::Error;
use weaver_image::{DescriptorError, ImageError, SignatureError, VerifyError};

use crate::callback::CallbackKind;

/// Configuration and generation errors
#[derive(Debug, Clone, Error)]
pub enum WeaverError {
    /// Callback does not expose any recognized capability
    #[error("Unknown callback kind: {0}")]
    UnknownCallbackKind(String),

    /// Callback exposes more than one recognized capability
    #[error("Ambiguous callback kind for {type_name}: matches {kinds:?}")]
    AmbiguousCallbackKind {
        /// Rust type of the callback
        type_name: String,
        /// Every kind it matched
        kinds: Vec<CallbackKind>,
    },

    /// Neither callbacks nor callback kinds were configured
    #[error("Callbacks or callback kinds are required")]
    MissingCallbacks,

    /// Number of callbacks does not match the number of slots
    #[error("Expected {expected} callback(s), got {actual}")]
    CallbackCountMismatch {
        /// Slot count of the generated type
        expected: usize,
        /// Number supplied
        actual: usize,
    },

    /// More than one callback kind without a filter
    #[error("Multiple callback kinds require a callback filter")]
    MissingCallbackFilter,

    /// Filter returned a slot index that does not exist
    #[error("Callback filter returned {index} for {method}, but only {slots} slot(s) exist")]
    FilterIndexOutOfRange {
        /// Method key
        method: String,
        /// Returned index
        index: usize,
        /// Number of slots
        slots: usize,
    },

    /// Callback kind does not match the kind declared for its slot
    #[error("Callback {index} must be a {expected:?}, found {actual:?}")]
    CallbackTypeMismatch {
        /// Slot index
        index: usize,
        /// Declared slot kind
        expected: CallbackKind,
        /// Kind of the supplied callback
        actual: CallbackKind,
    },

    /// Slot index outside the generated type's slots
    #[error("Callback index {index} out of range ({slots} slot(s))")]
    CallbackIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of slots
        slots: usize,
    },

    /// Superclass is final
    #[error("Cannot subclass final class {0}")]
    CannotSubclassFinal(String),

    /// An interface named as superclass of a class definition
    #[error("{0} is an interface and cannot be extended")]
    ExtendsInterface(String),

    /// A class listed as interface is not one
    #[error("{0} is not an interface")]
    NotAnInterface(String),

    /// Base class has no constructor visible to subclasses
    #[error("Superclass {0} has no visible constructors")]
    NoVisibleConstructors(String),

    /// No constructor matches the requested parameter types
    #[error("No constructor {signature} on {class}")]
    NoMatchingConstructor {
        /// Generated class name
        class: String,
        /// Requested constructor signature
        signature: String,
    },

    /// Class not defined in the loader
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Class already defined
    #[error("Duplicate class definition: {0}")]
    DuplicateClass(String),

    /// Method declared twice in one class
    #[error("Duplicate method {signature} in {class}")]
    DuplicateMethod {
        /// Class name
        class: String,
        /// Method key
        signature: String,
    },

    /// No artifact is available for a class
    #[error("No class image available for {0}")]
    MissingArtifact(String),

    /// Object was not created by the proxy generator
    #[error("{0} is not an enhanced class")]
    NotEnhanced(String),

    /// Generated without factory support
    #[error("{0} was generated without factory support")]
    NotAFactory(String),

    /// Emitted image does not carry the expected name
    #[error("Generated image name mismatch: expected {expected}, found {actual}")]
    NameMismatch {
        /// Name chosen by the naming policy
        expected: String,
        /// Name read back from the image
        actual: String,
    },

    /// Invalid method declaration
    #[error("Invalid signature: {0}")]
    Signature(#[from] SignatureError),

    /// Invalid type name
    #[error("Invalid type: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Unreadable class image
    #[error("Class image error: {0}")]
    Image(#[from] ImageError),

    /// Code builder misuse (unmarked label, emission after build)
    #[error("Code emission failed: {0}")]
    Emit(String),

    /// Emitted code failed verification
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Constructor raised a failure while creating an instance
    #[error("Instantiation failed: {0}")]
    Invoke(#[from] InvokeError),
}

/// A failure raised by user code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throwable {
    /// Class name of the failure
    pub class_name: String,
    /// Message
    pub message: String,
}

impl Throwable {
    /// Create a throwable
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

/// Errors raised while invoking methods
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// User failure, propagated unchanged
    #[error("{0}")]
    Thrown(Throwable),

    /// An abstract method was reached with nothing to run
    #[error("Abstract method invoked: {owner}.{signature}")]
    AbstractMethod {
        /// Declaring class
        owner: String,
        /// Method key
        signature: String,
    },

    /// No method with this signature on the receiver
    #[error("No such method {signature} on {class}")]
    NoSuchMethod {
        /// Receiver or owner class
        class: String,
        /// Method key
        signature: String,
    },

    /// Value is not an instance of the target type
    #[error("Cannot cast {from} to {to}")]
    ClassCast {
        /// Runtime type of the value
        from: String,
        /// Target type
        to: String,
    },

    /// Receiver was null
    #[error("Null receiver for {0}")]
    NullPointer(String),

    /// Wrong number of arguments
    #[error("{signature} expects {expected} argument(s), got {actual}")]
    ArgumentCount {
        /// Method key
        signature: String,
        /// Declared arity
        expected: usize,
        /// Supplied arity
        actual: usize,
    },

    /// Method declaration passed to a call could not be parsed
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// Runtime invariant violated (bad stack, missing slot)
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl InvokeError {
    /// User failure with a class name and message
    pub fn thrown(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        InvokeError::Thrown(Throwable::new(class_name, message))
    }

    /// Whether this is a user failure
    pub fn is_thrown(&self) -> bool {
        matches!(self, InvokeError::Thrown(_))
    }
}

/// Result of configuration and generation
pub type WeaverResult<T> = Result<T, WeaverError>;

/// Result of method invocation
pub type InvokeResult<T> = Result<T, InvokeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WeaverError::CallbackCountMismatch {
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Expected 1 callback(s), got 2");

        let err = InvokeError::thrown("java.lang.IllegalStateException", "boom");
        assert_eq!(err.to_string(), "java.lang.IllegalStateException: boom");
        assert!(err.is_thrown());

        let err = InvokeError::AbstractMethod {
            owner: "pkg.Shape".to_string(),
            signature: "area()D".to_string(),
        };
        assert!(!err.is_thrown());
        assert_eq!(err.to_string(), "Abstract method invoked: pkg.Shape.area()D");
    }

    #[test]
    fn test_conversions() {
        let sig_err = weaver_image::Signature::parse("broken").unwrap_err();
        let err: WeaverError = sig_err.into();
        assert!(matches!(err, WeaverError::Signature(_)));

        let invoke: InvokeError = InvokeError::thrown("E", "m");
        let err: WeaverError = invoke.into();
        assert!(matches!(err, WeaverError::Invoke(InvokeError::Thrown(_))));
    }
}
