//! Visitor-based image reader
//!
//! [`ClassReader`] walks an image and reports what it finds to a
//! [`ClassVisitor`]. A visitor stops the walk by returning
//! [`ControlFlow::Break`]; method bodies are only decoded when the visitor
//! asks for them, so a scan that only needs the header never touches code.

use std::ops::ControlFlow;

use crate::constants::ConstantPool;
use crate::encoder::ImageReader;
use crate::format::{
    decode_insn, open, read_code_length, read_field, read_header, read_method_header,
    AccessFlags, FieldImage, ImageError,
};
use crate::opcode::Insn;
use crate::signature::Signature;

/// Class-level facts, reported first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    /// Image flags
    pub flags: u32,
    /// Class access flags
    pub access: AccessFlags,
    /// Dotted class name
    pub name: String,
    /// Dotted superclass name
    pub super_name: Option<String>,
    /// Dotted interface names
    pub interfaces: Vec<String>,
}

/// A method as seen before its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHeader {
    /// Access flags
    pub access: AccessFlags,
    /// Method identity
    pub signature: Signature,
    /// Declared exception class names
    pub exceptions: Vec<String>,
    /// Whether the method carries code
    pub has_code: bool,
}

/// What to do with a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodAction {
    /// Skip the body without decoding it
    SkipBody,
    /// Decode the body and report each instruction
    VisitBody,
}

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The whole image was visited
    Completed,
    /// The visitor stopped early
    Stopped,
}

/// Receives image contents in declaration order
///
/// Every callback defaults to "continue, skip bodies".
pub trait ClassVisitor {
    /// Class header
    fn visit(&mut self, _header: &ClassHeader) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// A declared field
    fn visit_field(&mut self, _field: &FieldImage) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// A declared method; the return value decides whether its body is read
    fn visit_method(&mut self, _method: &MethodHeader) -> ControlFlow<(), MethodAction> {
        ControlFlow::Continue(MethodAction::SkipBody)
    }

    /// One instruction of a body requested with [`MethodAction::VisitBody`]
    fn visit_insn(&mut self, _insn: &Insn) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// End of a visited body (not called when the visitor broke inside it)
    fn visit_method_end(&mut self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Reader over encoded image bytes
pub struct ClassReader<'a> {
    flags: u32,
    pool: ConstantPool,
    reader: ImageReader<'a>,
}

impl<'a> ClassReader<'a> {
    /// Validate the header and load the constant pool
    pub fn new(data: &'a [u8]) -> Result<Self, ImageError> {
        let (flags, mut reader) = open(data)?;
        let pool = ConstantPool::decode(&mut reader)?;
        Ok(Self {
            flags,
            pool,
            reader,
        })
    }

    /// Walk the image, reporting to `visitor`
    pub fn accept(mut self, visitor: &mut dyn ClassVisitor) -> Result<ScanOutcome, ImageError> {
        let (access, name, super_name, interfaces) = read_header(&self.pool, &mut self.reader)?;
        let header = ClassHeader {
            flags: self.flags,
            access,
            name,
            super_name,
            interfaces,
        };
        if visitor.visit(&header).is_break() {
            return Ok(ScanOutcome::Stopped);
        }

        let field_count = self.reader.read_u32()?;
        for _ in 0..field_count {
            let field = read_field(&self.pool, &mut self.reader)?;
            if visitor.visit_field(&field).is_break() {
                return Ok(ScanOutcome::Stopped);
            }
        }

        let method_count = self.reader.read_u32()?;
        for _ in 0..method_count {
            let (access, signature, exceptions) = read_method_header(&self.pool, &mut self.reader)?;
            let code_len = read_code_length(&mut self.reader)?;
            let method = MethodHeader {
                access,
                signature,
                exceptions,
                has_code: code_len.is_some(),
            };

            let action = match visitor.visit_method(&method) {
                ControlFlow::Break(()) => return Ok(ScanOutcome::Stopped),
                ControlFlow::Continue(action) => action,
            };

            let Some(len) = code_len else { continue };
            if action == MethodAction::SkipBody {
                self.reader.skip(len)?;
                continue;
            }

            let count = self.reader.read_u32()?;
            for _ in 0..count {
                let insn = decode_insn(&self.pool, &mut self.reader)?;
                if visitor.visit_insn(&insn).is_break() {
                    return Ok(ScanOutcome::Stopped);
                }
            }
            if visitor.visit_method_end().is_break() {
                return Ok(ScanOutcome::Stopped);
            }
        }

        Ok(ScanOutcome::Completed)
    }
}

/// Read only the class header, stopping before fields and methods
pub fn read_header_only(data: &[u8]) -> Result<ClassHeader, ImageError> {
    struct HeaderVisitor(Option<ClassHeader>);

    impl ClassVisitor for HeaderVisitor {
        fn visit(&mut self, header: &ClassHeader) -> ControlFlow<()> {
            self.0 = Some(header.clone());
            ControlFlow::Break(())
        }
    }

    let mut visitor = HeaderVisitor(None);
    ClassReader::new(data)?.accept(&mut visitor)?;
    visitor.0.ok_or(ImageError::Decode(crate::encoder::DecodeError::Malformed {
        offset: 0,
        message: "missing class header".to_string(),
    }))
}

/// Read only the class name
pub fn read_class_name(data: &[u8]) -> Result<String, ImageError> {
    read_header_only(data).map(|header| header.name)
}
