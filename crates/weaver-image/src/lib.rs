//! Weaver class images
//!
//! This crate provides the type descriptor and signature model, the
//! instruction set for method bodies, and the binary class image format with
//! its visitor-based reader, verifier and disassembler.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod constants;
pub mod descriptor;
pub mod disasm;
pub mod encoder;
pub mod format;
pub mod opcode;
pub mod reader;
pub mod signature;
pub mod verify;

pub use constants::ConstantPool;
pub use descriptor::{DescriptorError, PrimitiveKind, TypeDescriptor};
pub use disasm::{disassemble, disassemble_image};
pub use encoder::{DecodeError, ImageReader, ImageWriter};
pub use format::{fingerprint, flags, AccessFlags, ClassImage, FieldImage, ImageError, MethodImage};
pub use opcode::{Insn, InvokeKind, Opcode};
pub use reader::{
    read_class_name, read_header_only, ClassHeader, ClassReader, ClassVisitor, MethodAction,
    MethodHeader, ScanOutcome,
};
pub use signature::{MethodDescriptor, Signature, SignatureError};
pub use verify::{verify_image, verify_method, VerifyError};
