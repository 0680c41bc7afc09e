//! Code verification
//!
//! Checks every method body of an image before it is defined: jump targets,
//! argument indices, stack discipline and termination. Stack depth must agree
//! at every merge point.

use crate::format::{ClassImage, MethodImage};
use crate::opcode::Insn;

/// Code verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Jump outside the body
    #[error("{method}: invalid jump target {target} at {index}")]
    InvalidJumpTarget {
        /// Method key
        method: String,
        /// Target instruction index
        target: u32,
        /// Jump instruction index
        index: usize,
    },

    /// Argument index beyond the method's arity
    #[error("{method}: argument {arg} out of range at {index}")]
    InvalidArgument {
        /// Method key
        method: String,
        /// Argument index
        arg: u16,
        /// Instruction index
        index: usize,
    },

    /// Pop from an empty stack
    #[error("{method}: stack underflow at {index}")]
    StackUnderflow {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
    },

    /// Two paths reach one instruction with different depths
    #[error("{method}: inconsistent stack depth at {index} ({expected} vs {actual})")]
    StackMismatch {
        /// Method key
        method: String,
        /// Instruction index
        index: usize,
        /// Depth recorded first
        expected: usize,
        /// Conflicting depth
        actual: usize,
    },

    /// Execution runs past the last instruction
    #[error("{method}: execution falls off end of code")]
    FallOffEnd {
        /// Method key
        method: String,
    },

    /// Code attached to an abstract method, or missing from a concrete one
    #[error("{method}: {message}")]
    BadBody {
        /// Method key
        method: String,
        /// What is wrong
        message: &'static str,
    },
}

/// Verify all method bodies of an image
pub fn verify_image(image: &ClassImage) -> Result<(), VerifyError> {
    for method in &image.methods {
        verify_method(method)?;
    }
    Ok(())
}

/// Verify one method
pub fn verify_method(method: &MethodImage) -> Result<(), VerifyError> {
    let key = method.signature.to_string();
    let bodyless = method.access.is_abstract() || method.access.intersects(crate::format::AccessFlags::NATIVE);
    match (&method.code, bodyless) {
        (Some(_), true) => Err(VerifyError::BadBody {
            method: key,
            message: "abstract or native method has code",
        }),
        (None, false) => Err(VerifyError::BadBody {
            method: key,
            message: "concrete method has no code",
        }),
        (None, true) => Ok(()),
        (Some(code), false) => verify_code(&key, method.signature.params().len(), code),
    }
}

fn verify_code(method: &str, arity: usize, code: &[Insn]) -> Result<(), VerifyError> {
    if code.is_empty() {
        return Err(VerifyError::FallOffEnd {
            method: method.to_string(),
        });
    }

    let mut depths: Vec<Option<usize>> = vec![None; code.len()];
    let mut worklist = vec![(0usize, 0usize)];

    while let Some((index, depth)) = worklist.pop() {
        let Some(insn) = code.get(index) else {
            return Err(VerifyError::FallOffEnd {
                method: method.to_string(),
            });
        };
        match depths[index] {
            Some(expected) if expected == depth => continue,
            Some(expected) => {
                return Err(VerifyError::StackMismatch {
                    method: method.to_string(),
                    index,
                    expected,
                    actual: depth,
                })
            }
            None => depths[index] = Some(depth),
        }

        if let Insn::LoadArg(arg) = insn {
            if *arg as usize >= arity {
                return Err(VerifyError::InvalidArgument {
                    method: method.to_string(),
                    arg: *arg,
                    index,
                });
            }
        }

        let (pops, pushes) = insn.stack_effect();
        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                method: method.to_string(),
                index,
            });
        }
        let next_depth = depth - pops + pushes;

        if let Some(target) = insn.jump_target() {
            if target as usize >= code.len() {
                return Err(VerifyError::InvalidJumpTarget {
                    method: method.to_string(),
                    target,
                    index,
                });
            }
            worklist.push((target as usize, next_depth));
        }
        if !insn.is_terminal() {
            worklist.push((index + 1, next_depth));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AccessFlags;
    use crate::signature::Signature;

    fn method(decl: &str, code: Option<Vec<Insn>>) -> MethodImage {
        MethodImage {
            access: AccessFlags::PUBLIC,
            signature: Signature::parse(decl).unwrap(),
            exceptions: Vec::new(),
            code,
        }
    }

    #[test]
    fn test_dispatch_shape_verifies() {
        let code = vec![
            Insn::LoadCallback(0),
            Insn::Dup,
            Insn::JumpIfNull(6),
            Insn::InvokeCallback { method: 0 },
            Insn::CoerceReturn(crate::descriptor::TypeDescriptor::INT),
            Insn::Return,
            Insn::Pop,
            Insn::LoadThis,
            Insn::LoadArg(0),
            Insn::Invoke {
                kind: crate::opcode::InvokeKind::Special,
                owner: "pkg.Proxy".to_string(),
                signature: Signature::parse("int WEAVER$inc$0(int)").unwrap(),
            },
            Insn::Return,
        ];
        assert!(verify_method(&method("int inc(int)", Some(code))).is_ok());
    }

    #[test]
    fn test_errors() {
        let m = method("void run()", Some(vec![Insn::LoadArg(0), Insn::ReturnVoid]));
        assert!(matches!(verify_method(&m), Err(VerifyError::InvalidArgument { .. })));

        let m = method("void run()", Some(vec![Insn::Pop, Insn::ReturnVoid]));
        assert!(matches!(verify_method(&m), Err(VerifyError::StackUnderflow { .. })));

        let m = method("void run()", Some(vec![Insn::Jump(9)]));
        assert!(matches!(verify_method(&m), Err(VerifyError::InvalidJumpTarget { .. })));

        let m = method("void run()", Some(vec![Insn::LoadThis, Insn::Pop]));
        assert!(matches!(verify_method(&m), Err(VerifyError::FallOffEnd { .. })));

        let m = method("void run()", None);
        assert!(matches!(verify_method(&m), Err(VerifyError::BadBody { .. })));
    }

    #[test]
    fn test_stack_mismatch_at_merge() {
        let code = vec![
            Insn::LoadThis,
            Insn::JumpIfNull(3),
            Insn::LoadThis,
            Insn::ReturnVoid,
        ];
        let m = method("void run()", Some(code));
        assert!(matches!(verify_method(&m), Err(VerifyError::StackMismatch { .. })));
    }
}
