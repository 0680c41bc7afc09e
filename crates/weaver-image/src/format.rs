//! Class image format
//!
//! A class image is the binary artifact of one class: its header, fields and
//! methods with optional code bodies. Images are what the metadata reader
//! scans and what the loader defines generated types from.
//!
//! Layout:
//!
//! | Section   | Contents                                                     |
//! |-----------|--------------------------------------------------------------|
//! | Header    | magic `WVCI`, version (u32), flags (u32), CRC-32 of payload  |
//! | Pool      | string constant pool                                         |
//! | Class     | access, name, super (optional), interfaces                   |
//! | Fields    | access, name, descriptor                                     |
//! | Methods   | access, name, descriptor, exceptions, code (length-prefixed) |
//!
//! Code is length-prefixed so readers can skip bodies they do not need.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::constants::{ConstantPool, NO_INDEX};
use crate::descriptor::{to_class_name, to_internal_name, TypeDescriptor};
use crate::encoder::{DecodeError, ImageReader, ImageWriter};
use crate::opcode::{InvokeKind, Insn, Opcode};
use crate::signature::Signature;

/// Magic number for class images: "WVCI"
pub const MAGIC: [u8; 4] = *b"WVCI";

/// Current image version
pub const VERSION: u32 = 1;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 16;

/// Image flags
pub mod flags {
    /// Image was produced by the proxy generator
    pub const GENERATED: u32 = 1 << 0;
}

/// Image encoding/decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected WVCI, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        actual: u32,
    },
}

// ===== Access flags =====

/// Access and property flags for classes, fields and methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    /// No flags (package-private)
    pub const NONE: AccessFlags = AccessFlags(0);
    /// `public`
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    /// `private`
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    /// `protected`
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    /// `static`
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    /// `final`
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    /// `synchronized`
    pub const SYNCHRONIZED: AccessFlags = AccessFlags(0x0020);
    /// Compiler-generated bridge method
    pub const BRIDGE: AccessFlags = AccessFlags(0x0040);
    /// Variable arity method
    pub const VARARGS: AccessFlags = AccessFlags(0x0080);
    /// `native`
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    /// Interface type
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    /// `abstract`
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    /// Compiler-generated member
    pub const SYNTHETIC: AccessFlags = AccessFlags(0x1000);

    /// Whether all bits of `other` are set
    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set
    pub fn intersects(self, other: AccessFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Flags with `other` cleared
    pub fn without(self, other: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 & !other.0)
    }

    /// Visibility flags only
    pub fn visibility(self) -> AccessFlags {
        AccessFlags(self.0 & (Self::PUBLIC.0 | Self::PRIVATE.0 | Self::PROTECTED.0))
    }

    /// Neither public, protected nor private
    pub fn is_package_private(self) -> bool {
        self.visibility() == Self::NONE
    }

    /// `public`
    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    /// `private`
    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    /// `protected`
    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    /// `static`
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// `final`
    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    /// Bridge method
    pub fn is_bridge(self) -> bool {
        self.contains(Self::BRIDGE)
    }

    /// `abstract`
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    /// Interface type
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// Synthetic member
    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessFlags {
    fn bitor_assign(&mut self, rhs: AccessFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const WORDS: [(AccessFlags, &str); 10] = [
            (AccessFlags::PUBLIC, "public"),
            (AccessFlags::PRIVATE, "private"),
            (AccessFlags::PROTECTED, "protected"),
            (AccessFlags::STATIC, "static"),
            (AccessFlags::FINAL, "final"),
            (AccessFlags::SYNCHRONIZED, "synchronized"),
            (AccessFlags::BRIDGE, "bridge"),
            (AccessFlags::NATIVE, "native"),
            (AccessFlags::ABSTRACT, "abstract"),
            (AccessFlags::SYNTHETIC, "synthetic"),
        ];
        let words: Vec<&str> = WORDS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, word)| *word)
            .collect();
        f.write_str(&words.join(" "))
    }
}

// ===== Image model =====

/// A field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldImage {
    /// Access flags
    pub access: AccessFlags,
    /// Field name
    pub name: String,
    /// Field type
    pub descriptor: TypeDescriptor,
}

/// A method declaration with its optional body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodImage {
    /// Access flags
    pub access: AccessFlags,
    /// Method identity
    pub signature: Signature,
    /// Declared exception class names
    pub exceptions: Vec<String>,
    /// Body; `None` for abstract and native methods
    pub code: Option<Vec<Insn>>,
}

/// One class in image form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassImage {
    /// Image flags (see [`flags`])
    pub flags: u32,
    /// Class access flags
    pub access: AccessFlags,
    /// Dotted class name
    pub name: String,
    /// Dotted superclass name (`None` only for the root class)
    pub super_name: Option<String>,
    /// Dotted names of directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldImage>,
    /// Declared methods and constructors
    pub methods: Vec<MethodImage>,
}

impl ClassImage {
    /// Create an empty public class image
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            flags: 0,
            access: AccessFlags::PUBLIC,
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Find a declared method by signature
    pub fn find_method(&self, signature: &Signature) -> Option<&MethodImage> {
        self.methods.iter().find(|m| &m.signature == signature)
    }

    /// Encode to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut body = ImageWriter::new();

        body.emit_u16(self.access.0);
        body.emit_u32(pool.add_string(&to_internal_name(&self.name)));
        let super_internal = self.super_name.as_deref().map(to_internal_name);
        body.emit_u32(pool.add_optional(super_internal.as_deref()));
        body.emit_u32(self.interfaces.len() as u32);
        for iface in &self.interfaces {
            body.emit_u32(pool.add_string(&to_internal_name(iface)));
        }

        body.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            body.emit_u16(field.access.0);
            body.emit_u32(pool.add_string(&field.name));
            body.emit_u32(pool.add_string(&field.descriptor.descriptor()));
        }

        body.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            encode_method(method, &mut pool, &mut body);
        }

        let mut writer = ImageWriter::with_capacity(HEADER_SIZE + body.offset() + pool.len() * 16);
        writer.emit_bytes(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.flags);
        let checksum_offset = writer.reserve_u32();
        pool.encode(&mut writer);
        writer.emit_bytes(body.buffer());

        let checksum = crc32fast::hash(&writer.buffer()[HEADER_SIZE..]);
        writer.patch_u32(checksum_offset, checksum);
        writer.into_bytes()
    }

    /// Decode an image, verifying magic, version and checksum
    pub fn decode(data: &[u8]) -> Result<Self, ImageError> {
        let (flags, mut reader) = open(data)?;
        let pool = ConstantPool::decode(&mut reader)?;
        let header = read_header(&pool, &mut reader)?;

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(reader.remaining()));
        for _ in 0..field_count {
            fields.push(read_field(&pool, &mut reader)?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(reader.remaining()));
        for _ in 0..method_count {
            let (access, signature, exceptions) = read_method_header(&pool, &mut reader)?;
            let code = match read_code_length(&mut reader)? {
                Some(len) => Some(decode_code(&pool, &mut reader, len)?),
                None => None,
            };
            methods.push(MethodImage {
                access,
                signature,
                exceptions,
                code,
            });
        }

        Ok(Self {
            flags,
            access: header.0,
            name: header.1,
            super_name: header.2,
            interfaces: header.3,
            fields,
            methods,
        })
    }
}

/// SHA-256 fingerprint of encoded image bytes, as lowercase hex
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ===== Encoding helpers =====

fn encode_method(method: &MethodImage, pool: &mut ConstantPool, body: &mut ImageWriter) {
    body.emit_u16(method.access.0);
    body.emit_u32(pool.add_string(method.signature.name()));
    body.emit_u32(pool.add_string(&method.signature.descriptor().to_string()));
    body.emit_u32(method.exceptions.len() as u32);
    for exception in &method.exceptions {
        body.emit_u32(pool.add_string(&to_internal_name(exception)));
    }

    match &method.code {
        Some(code) => {
            body.emit_u8(1);
            let len_offset = body.reserve_u32();
            let start = body.offset();
            body.emit_u32(code.len() as u32);
            for insn in code {
                encode_insn(insn, pool, body);
            }
            let len = (body.offset() - start) as u32;
            body.patch_u32(len_offset, len);
        }
        None => body.emit_u8(0),
    }
}

/// Encode a single instruction
pub(crate) fn encode_insn(insn: &Insn, pool: &mut ConstantPool, writer: &mut ImageWriter) {
    writer.emit_opcode(insn.opcode());
    match insn {
        Insn::LoadArg(n) | Insn::LoadCallback(n) => writer.emit_u16(*n),
        Insn::Jump(target) | Insn::JumpIfNull(target) => writer.emit_u32(*target),
        Insn::Invoke {
            owner, signature, ..
        } => {
            writer.emit_u32(pool.add_string(&to_internal_name(owner)));
            writer.emit_u32(pool.add_string(signature.name()));
            writer.emit_u32(pool.add_string(&signature.descriptor().to_string()));
        }
        Insn::InvokeCallback { method } => writer.emit_u32(*method),
        Insn::Checkcast(ty) | Insn::CoerceReturn(ty) => {
            writer.emit_u32(pool.add_string(&ty.descriptor()));
        }
        Insn::LoadThis
        | Insn::Dup
        | Insn::Pop
        | Insn::Return
        | Insn::ReturnVoid
        | Insn::ThrowAbstract => {}
    }
}

// ===== Decoding helpers (shared with the visitor reader) =====

/// Class header fields: access, name, super, interfaces
pub(crate) type RawHeader = (AccessFlags, String, Option<String>, Vec<String>);

/// Validate the fixed header and return the flags plus a reader at the pool
pub(crate) fn open(data: &[u8]) -> Result<(u32, ImageReader<'_>), ImageError> {
    let mut reader = ImageReader::new(data);
    let magic = reader.read_bytes(4)?;
    let magic = [magic[0], magic[1], magic[2], magic[3]];
    if magic != MAGIC {
        return Err(ImageError::InvalidMagic(magic));
    }

    let version = reader.read_u32()?;
    if version != VERSION {
        return Err(ImageError::UnsupportedVersion(version));
    }

    let flags = reader.read_u32()?;
    let stored = reader.read_u32()?;
    let actual = crc32fast::hash(&data[HEADER_SIZE..]);
    if stored != actual {
        return Err(ImageError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }
    Ok((flags, reader))
}

pub(crate) fn read_header(
    pool: &ConstantPool,
    reader: &mut ImageReader<'_>,
) -> Result<RawHeader, DecodeError> {
    let access = AccessFlags(reader.read_u16()?);
    let name = to_class_name(pool.resolve(reader.read_u32()?)?);
    let super_index = reader.read_u32()?;
    let super_name = if super_index == NO_INDEX {
        None
    } else {
        Some(to_class_name(pool.resolve(super_index)?))
    };
    let count = reader.read_u32()? as usize;
    let mut interfaces = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        interfaces.push(to_class_name(pool.resolve(reader.read_u32()?)?));
    }
    Ok((access, name, super_name, interfaces))
}

pub(crate) fn read_field(
    pool: &ConstantPool,
    reader: &mut ImageReader<'_>,
) -> Result<FieldImage, DecodeError> {
    let access = AccessFlags(reader.read_u16()?);
    let name = pool.resolve(reader.read_u32()?)?.to_string();
    let offset = reader.position();
    let descriptor = TypeDescriptor::parse(pool.resolve(reader.read_u32()?)?)
        .map_err(|e| malformed(offset, e))?;
    Ok(FieldImage {
        access,
        name,
        descriptor,
    })
}

pub(crate) fn read_method_header(
    pool: &ConstantPool,
    reader: &mut ImageReader<'_>,
) -> Result<(AccessFlags, Signature, Vec<String>), DecodeError> {
    let access = AccessFlags(reader.read_u16()?);
    let offset = reader.position();
    let signature = read_signature(pool, reader, offset)?;
    let count = reader.read_u32()? as usize;
    let mut exceptions = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        exceptions.push(to_class_name(pool.resolve(reader.read_u32()?)?));
    }
    Ok((access, signature, exceptions))
}

/// Read the code marker; returns the body length in bytes if present
pub(crate) fn read_code_length(reader: &mut ImageReader<'_>) -> Result<Option<usize>, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(None),
        _ => Ok(Some(reader.read_u32()? as usize)),
    }
}

pub(crate) fn decode_code(
    pool: &ConstantPool,
    reader: &mut ImageReader<'_>,
    len: usize,
) -> Result<Vec<Insn>, DecodeError> {
    let end = reader.position() + len;
    let count = reader.read_u32()? as usize;
    let mut code = Vec::with_capacity(count.min(len));
    for _ in 0..count {
        code.push(decode_insn(pool, reader)?);
    }
    if reader.position() != end {
        return Err(DecodeError::Malformed {
            offset: reader.position(),
            message: format!("code length mismatch, expected end at {}", end),
        });
    }
    Ok(code)
}

/// Decode a single instruction
pub(crate) fn decode_insn(
    pool: &ConstantPool,
    reader: &mut ImageReader<'_>,
) -> Result<Insn, DecodeError> {
    let offset = reader.position();
    let insn = match reader.read_opcode()? {
        Opcode::LoadThis => Insn::LoadThis,
        Opcode::LoadArg => Insn::LoadArg(reader.read_u16()?),
        Opcode::LoadCallback => Insn::LoadCallback(reader.read_u16()?),
        Opcode::Dup => Insn::Dup,
        Opcode::Pop => Insn::Pop,
        Opcode::Jump => Insn::Jump(reader.read_u32()?),
        Opcode::JumpIfNull => Insn::JumpIfNull(reader.read_u32()?),
        op @ (Opcode::InvokeVirtual | Opcode::InvokeSpecial | Opcode::InvokeInterface) => {
            let kind = match op {
                Opcode::InvokeSpecial => InvokeKind::Special,
                Opcode::InvokeInterface => InvokeKind::Interface,
                _ => InvokeKind::Virtual,
            };
            let owner = to_class_name(pool.resolve(reader.read_u32()?)?);
            let signature = read_signature(pool, reader, offset)?;
            Insn::Invoke {
                kind,
                owner,
                signature,
            }
        }
        Opcode::InvokeCallback => Insn::InvokeCallback {
            method: reader.read_u32()?,
        },
        op @ (Opcode::Checkcast | Opcode::CoerceReturn) => {
            let ty = TypeDescriptor::parse(pool.resolve(reader.read_u32()?)?)
                .map_err(|e| malformed(offset, e))?;
            if op == Opcode::Checkcast {
                Insn::Checkcast(ty)
            } else {
                Insn::CoerceReturn(ty)
            }
        }
        Opcode::Return => Insn::Return,
        Opcode::ReturnVoid => Insn::ReturnVoid,
        Opcode::ThrowAbstract => Insn::ThrowAbstract,
    };
    Ok(insn)
}

fn read_signature(
    pool: &ConstantPool,
    reader: &mut ImageReader<'_>,
    offset: usize,
) -> Result<Signature, DecodeError> {
    let name = pool.resolve(reader.read_u32()?)?;
    let descriptor = pool.resolve(reader.read_u32()?)?;
    Signature::from_descriptor(name, descriptor).map_err(|e| malformed(offset, e))
}

fn malformed(offset: usize, error: impl fmt::Display) -> DecodeError {
    DecodeError::Malformed {
        offset,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClassImage {
        let mut image = ClassImage::new("pkg.Base", Some("java.lang.Object".to_string()));
        image.interfaces.push("pkg.Greeter".to_string());
        image.fields.push(FieldImage {
            access: AccessFlags::PRIVATE,
            name: "count".to_string(),
            descriptor: TypeDescriptor::INT,
        });
        image.methods.push(MethodImage {
            access: AccessFlags::PUBLIC | AccessFlags::BRIDGE | AccessFlags::SYNTHETIC,
            signature: Signature::parse("Object get()").unwrap(),
            exceptions: vec!["java.io.IOException".to_string()],
            code: Some(vec![
                Insn::LoadThis,
                Insn::Invoke {
                    kind: InvokeKind::Special,
                    owner: "pkg.Base".to_string(),
                    signature: Signature::parse("String get()").unwrap(),
                },
                Insn::Return,
            ]),
        });
        image.methods.push(MethodImage {
            access: AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
            signature: Signature::parse("void run()").unwrap(),
            exceptions: Vec::new(),
            code: None,
        });
        image
    }

    #[test]
    fn test_image_encode_decode() {
        let image = sample();
        let bytes = image.encode();
        assert_eq!(&bytes[..4], &MAGIC);

        let decoded = ClassImage::decode(&bytes).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn test_checksum_validation() {
        let mut bytes = sample().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            ClassImage::decode(&bytes),
            Err(ImageError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_magic_and_version() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(
            ClassImage::decode(&bytes),
            Err(ImageError::InvalidMagic(_))
        ));

        let mut bytes = sample().encode();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            ClassImage::decode(&bytes),
            Err(ImageError::UnsupportedVersion(99))
        ));

        assert!(matches!(
            ClassImage::decode(b"WV"),
            Err(ImageError::Decode(DecodeError::UnexpectedEnd(_)))
        ));
    }

    #[test]
    fn test_access_flags() {
        let flags = AccessFlags::PUBLIC | AccessFlags::FINAL;
        assert!(flags.is_public());
        assert!(flags.is_final());
        assert!(!flags.is_static());
        assert_eq!(flags.without(AccessFlags::FINAL), AccessFlags::PUBLIC);
        assert!(AccessFlags::NONE.is_package_private());
        assert_eq!(flags.to_string(), "public final");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let bytes = sample().encode();
        let a = fingerprint(&bytes);
        assert_eq!(a.len(), 64);
        assert_eq!(a, fingerprint(&sample().encode()));
    }
}
