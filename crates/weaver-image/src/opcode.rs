//! Instruction set for method bodies
//!
//! Method bodies in a class image are short stack programs. The set is
//! deliberately small: it covers argument forwarding, constructor chaining,
//! bridge delegation and callback dispatch.
//!
//! Opcodes are organized into categories:
//! - 0x00-0x0F: Stack & locals
//! - 0x10-0x1F: Control flow
//! - 0x20-0x2F: Invocation
//! - 0x30-0x3F: Type conversion
//! - 0x40-0x4F: Return & failure

use crate::descriptor::TypeDescriptor;
use crate::signature::Signature;

/// Single-byte opcodes as they appear in encoded code
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack & locals (0x00-0x0F) =====
    /// Push the receiver
    LoadThis = 0x01,
    /// Push an argument (operand: u16 index)
    LoadArg = 0x02,
    /// Push the receiver's callback slot (operand: u16 slot)
    LoadCallback = 0x03,
    /// Duplicate top of stack
    Dup = 0x04,
    /// Discard top of stack
    Pop = 0x05,

    // ===== Control flow (0x10-0x1F) =====
    /// Unconditional jump (operand: u32 instruction index)
    Jump = 0x10,
    /// Pop, jump if null (operand: u32 instruction index)
    JumpIfNull = 0x11,

    // ===== Invocation (0x20-0x2F) =====
    /// Virtual call through the receiver's vtable (operands: owner, name, descriptor)
    InvokeVirtual = 0x20,
    /// Non-virtual call of a specific implementation (operands: owner, name, descriptor)
    InvokeSpecial = 0x21,
    /// Call through an interface (operands: owner, name, descriptor)
    InvokeInterface = 0x22,
    /// Pop a callback and dispatch to it (operand: u32 intercepted-method index)
    InvokeCallback = 0x23,

    // ===== Type conversion (0x30-0x3F) =====
    /// Check and convert top of stack (operand: type descriptor)
    Checkcast = 0x30,
    /// Convert a callback result to the declared return type (operand: type descriptor)
    CoerceReturn = 0x31,

    // ===== Return & failure (0x40-0x4F) =====
    /// Return top of stack
    Return = 0x40,
    /// Return nothing
    ReturnVoid = 0x41,
    /// Fail with "abstract method invoked"
    ThrowAbstract = 0x42,
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::LoadThis),
            0x02 => Some(Self::LoadArg),
            0x03 => Some(Self::LoadCallback),
            0x04 => Some(Self::Dup),
            0x05 => Some(Self::Pop),
            0x10 => Some(Self::Jump),
            0x11 => Some(Self::JumpIfNull),
            0x20 => Some(Self::InvokeVirtual),
            0x21 => Some(Self::InvokeSpecial),
            0x22 => Some(Self::InvokeInterface),
            0x23 => Some(Self::InvokeCallback),
            0x30 => Some(Self::Checkcast),
            0x31 => Some(Self::CoerceReturn),
            0x40 => Some(Self::Return),
            0x41 => Some(Self::ReturnVoid),
            0x42 => Some(Self::ThrowAbstract),
            _ => None,
        }
    }

    /// Encode to a byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic used by the disassembler
    pub fn name(self) -> &'static str {
        match self {
            Self::LoadThis => "load_this",
            Self::LoadArg => "load_arg",
            Self::LoadCallback => "load_callback",
            Self::Dup => "dup",
            Self::Pop => "pop",
            Self::Jump => "jump",
            Self::JumpIfNull => "jump_if_null",
            Self::InvokeVirtual => "invoke_virtual",
            Self::InvokeSpecial => "invoke_special",
            Self::InvokeInterface => "invoke_interface",
            Self::InvokeCallback => "invoke_callback",
            Self::Checkcast => "checkcast",
            Self::CoerceReturn => "coerce_return",
            Self::Return => "return",
            Self::ReturnVoid => "return_void",
            Self::ThrowAbstract => "throw_abstract",
        }
    }
}

/// Dispatch form of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    /// Resolved through the receiver's runtime class
    Virtual,
    /// Resolved against the named owner only (super calls, constructors)
    Special,
    /// Resolved through an interface
    Interface,
}

impl InvokeKind {
    /// Opcode for this dispatch form
    pub fn opcode(self) -> Opcode {
        match self {
            InvokeKind::Virtual => Opcode::InvokeVirtual,
            InvokeKind::Special => Opcode::InvokeSpecial,
            InvokeKind::Interface => Opcode::InvokeInterface,
        }
    }
}

/// A decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Push the receiver
    LoadThis,
    /// Push argument `n`
    LoadArg(u16),
    /// Push callback slot `n` of the receiver
    LoadCallback(u16),
    /// Duplicate top of stack
    Dup,
    /// Discard top of stack
    Pop,
    /// Jump to instruction index
    Jump(u32),
    /// Pop; jump to instruction index if null
    JumpIfNull(u32),
    /// Call `owner.signature` with receiver and arguments popped from the stack
    Invoke {
        /// Dispatch form
        kind: InvokeKind,
        /// Dotted name of the owning class
        owner: String,
        /// Target signature
        signature: Signature,
    },
    /// Pop a callback and dispatch the current call through it
    InvokeCallback {
        /// Index into the generated type's intercepted-method table
        method: u32,
    },
    /// Check the top of stack against a type
    Checkcast(TypeDescriptor),
    /// Convert the top of stack to a declared return type
    CoerceReturn(TypeDescriptor),
    /// Return top of stack
    Return,
    /// Return nothing
    ReturnVoid,
    /// Fail with "abstract method invoked"
    ThrowAbstract,
}

impl Insn {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Insn::LoadThis => Opcode::LoadThis,
            Insn::LoadArg(_) => Opcode::LoadArg,
            Insn::LoadCallback(_) => Opcode::LoadCallback,
            Insn::Dup => Opcode::Dup,
            Insn::Pop => Opcode::Pop,
            Insn::Jump(_) => Opcode::Jump,
            Insn::JumpIfNull(_) => Opcode::JumpIfNull,
            Insn::Invoke { kind, .. } => kind.opcode(),
            Insn::InvokeCallback { .. } => Opcode::InvokeCallback,
            Insn::Checkcast(_) => Opcode::Checkcast,
            Insn::CoerceReturn(_) => Opcode::CoerceReturn,
            Insn::Return => Opcode::Return,
            Insn::ReturnVoid => Opcode::ReturnVoid,
            Insn::ThrowAbstract => Opcode::ThrowAbstract,
        }
    }

    /// Jump target, if this is a branch
    pub fn jump_target(&self) -> Option<u32> {
        match self {
            Insn::Jump(target) | Insn::JumpIfNull(target) => Some(*target),
            _ => None,
        }
    }

    /// Whether control never falls through to the next instruction
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Insn::Jump(_) | Insn::Return | Insn::ReturnVoid | Insn::ThrowAbstract
        )
    }

    /// Stack effect as (pops, pushes)
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Insn::LoadThis | Insn::LoadArg(_) | Insn::LoadCallback(_) => (0, 1),
            Insn::Dup => (1, 2),
            Insn::Pop | Insn::JumpIfNull(_) => (1, 0),
            Insn::Jump(_) | Insn::ReturnVoid | Insn::ThrowAbstract => (0, 0),
            Insn::Invoke { signature, .. } => {
                let pushes = usize::from(!signature.return_type().is_void());
                (signature.params().len() + 1, pushes)
            }
            Insn::InvokeCallback { .. } => (1, 1),
            Insn::Checkcast(_) | Insn::CoerceReturn(_) => (1, 1),
            Insn::Return => (1, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_byte_mapping() {
        for byte in 0u8..=0xFF {
            if let Some(op) = Opcode::from_u8(byte) {
                assert_eq!(op.to_u8(), byte);
            }
        }
        assert_eq!(Opcode::from_u8(0x00), None);
        assert_eq!(Opcode::from_u8(0xFF), None);
    }

    #[test]
    fn test_invoke_stack_effect() {
        let insn = Insn::Invoke {
            kind: InvokeKind::Special,
            owner: "pkg.Base".to_string(),
            signature: Signature::parse("int add(int, int)").unwrap(),
        };
        assert_eq!(insn.opcode(), Opcode::InvokeSpecial);
        assert_eq!(insn.stack_effect(), (3, 1));

        let insn = Insn::Invoke {
            kind: InvokeKind::Virtual,
            owner: "pkg.Base".to_string(),
            signature: Signature::parse("void run()").unwrap(),
        };
        assert_eq!(insn.stack_effect(), (1, 0));
    }

    #[test]
    fn test_terminal_and_targets() {
        assert!(Insn::Return.is_terminal());
        assert!(Insn::Jump(3).is_terminal());
        assert!(!Insn::JumpIfNull(3).is_terminal());
        assert_eq!(Insn::JumpIfNull(7).jump_target(), Some(7));
        assert_eq!(Insn::Dup.jump_target(), None);
    }
}
