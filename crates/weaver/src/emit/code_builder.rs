//! Instruction list builder with label patching

use rustc_hash::FxHashMap;
use weaver_image::{Insn, InvokeKind, Signature, TypeDescriptor};

use crate::error::{WeaverError, WeaverResult};

/// A jump target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    id: usize,
}

/// Jump whose target is patched at build time
#[derive(Debug, Clone, Copy)]
struct UnresolvedJump {
    index: usize,
    label: Label,
}

/// Builds the code of one method
///
/// Tracks stack depth as instructions are emitted; a jump records the depth
/// at its target so code after an unconditional exit resumes at the right
/// depth when the label is marked.
#[derive(Debug)]
pub struct CodeBuilder {
    signature: Signature,
    code: Vec<Insn>,
    next_label: usize,
    label_positions: FxHashMap<usize, u32>,
    label_depths: FxHashMap<usize, usize>,
    unresolved: Vec<UnresolvedJump>,
    depth: usize,
    max_depth: usize,
    finalized: bool,
}

impl CodeBuilder {
    /// Builder for the body of `signature`
    pub fn new(signature: &Signature) -> Self {
        Self {
            signature: signature.clone(),
            code: Vec::with_capacity(16),
            next_label: 0,
            label_positions: FxHashMap::default(),
            label_depths: FxHashMap::default(),
            unresolved: Vec::new(),
            depth: 0,
            max_depth: 0,
            finalized: false,
        }
    }

    /// Current instruction index
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Deepest stack reached so far
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Append an instruction
    pub fn emit(&mut self, insn: Insn) -> WeaverResult<()> {
        if self.finalized {
            return Err(self.error("cannot modify a finalized builder"));
        }
        let (pops, pushes) = insn.stack_effect();
        if self.depth < pops {
            return Err(self.error(&format!("stack underflow at {}", self.code.len())));
        }
        self.depth = self.depth - pops + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        self.code.push(insn);
        Ok(())
    }

    // ===== Loads =====

    /// Push the receiver
    pub fn load_this(&mut self) -> WeaverResult<()> {
        self.emit(Insn::LoadThis)
    }

    /// Push one argument
    pub fn load_arg(&mut self, index: usize) -> WeaverResult<()> {
        let index = u16::try_from(index).map_err(|_| self.error("too many arguments"))?;
        self.emit(Insn::LoadArg(index))
    }

    /// Push every argument of the method being built
    pub fn load_args(&mut self) -> WeaverResult<()> {
        for index in 0..self.signature.params().len() {
            self.load_arg(index)?;
        }
        Ok(())
    }

    /// Push every argument, casting each to the matching type in `target`
    pub fn load_args_as(&mut self, target: &[TypeDescriptor]) -> WeaverResult<()> {
        let params = self.signature.params().to_vec();
        for (index, param) in params.iter().enumerate() {
            self.load_arg(index)?;
            match target.get(index) {
                Some(ty) if ty != param => self.checkcast(ty.clone())?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Push the callback in slot `slot` (null when empty)
    pub fn load_callback(&mut self, slot: usize) -> WeaverResult<()> {
        let slot = u16::try_from(slot).map_err(|_| self.error("too many callback slots"))?;
        self.emit(Insn::LoadCallback(slot))
    }

    /// Duplicate the top of the stack
    pub fn dup(&mut self) -> WeaverResult<()> {
        self.emit(Insn::Dup)
    }

    /// Discard the top of the stack
    pub fn pop(&mut self) -> WeaverResult<()> {
        self.emit(Insn::Pop)
    }

    // ===== Labels and control flow =====

    /// Create a label
    pub fn new_label(&mut self) -> Label {
        let label = Label { id: self.next_label };
        self.next_label += 1;
        label
    }

    /// Bind `label` to the next instruction
    pub fn mark(&mut self, label: Label) -> WeaverResult<()> {
        if self.finalized {
            return Err(self.error("cannot modify a finalized builder"));
        }
        if self.label_positions.contains_key(&label.id) {
            return Err(self.error("label marked twice"));
        }
        self.label_positions.insert(label.id, self.code.len() as u32);
        if let Some(&depth) = self.label_depths.get(&label.id) {
            self.depth = depth;
        }
        Ok(())
    }

    /// Unconditional jump
    pub fn jump(&mut self, label: Label) -> WeaverResult<()> {
        self.emit_jump(Insn::Jump(0), label)
    }

    /// Pop the top of the stack and jump if it is null
    pub fn jump_if_null(&mut self, label: Label) -> WeaverResult<()> {
        self.emit_jump(Insn::JumpIfNull(0), label)
    }

    fn emit_jump(&mut self, insn: Insn, label: Label) -> WeaverResult<()> {
        let index = self.code.len();
        self.emit(insn)?;
        self.label_depths.entry(label.id).or_insert(self.depth);
        self.unresolved.push(UnresolvedJump { index, label });
        Ok(())
    }

    // ===== Calls =====

    /// Call `signature` on the receiver below the arguments
    pub fn invoke(&mut self, kind: InvokeKind, owner: &str, signature: &Signature) -> WeaverResult<()> {
        self.emit(Insn::Invoke {
            kind,
            owner: owner.to_string(),
            signature: signature.clone(),
        })
    }

    /// Hand the callback on the stack the call for intercepted method `index`
    pub fn invoke_callback(&mut self, index: usize) -> WeaverResult<()> {
        let method = u32::try_from(index).map_err(|_| self.error("too many methods"))?;
        self.emit(Insn::InvokeCallback { method })
    }

    // ===== Conversions and exits =====

    /// Check the top of the stack against `ty`
    pub fn checkcast(&mut self, ty: TypeDescriptor) -> WeaverResult<()> {
        self.emit(Insn::Checkcast(ty))
    }

    /// Convert the top of the stack to the return type `ty`
    pub fn coerce_return(&mut self, ty: TypeDescriptor) -> WeaverResult<()> {
        self.emit(Insn::CoerceReturn(ty))
    }

    /// Return according to the method's return type
    pub fn return_value(&mut self) -> WeaverResult<()> {
        if self.signature.return_type().is_void() {
            self.emit(Insn::ReturnVoid)
        } else {
            self.emit(Insn::Return)
        }
    }

    /// Fail with "abstract method invoked"
    pub fn throw_abstract(&mut self) -> WeaverResult<()> {
        self.emit(Insn::ThrowAbstract)
    }

    /// Patch jumps and return the finished code
    pub fn build(&mut self) -> WeaverResult<Vec<Insn>> {
        if self.finalized {
            return Err(self.error("builder already finalized"));
        }
        for jump in std::mem::take(&mut self.unresolved) {
            let target = *self
                .label_positions
                .get(&jump.label.id)
                .ok_or_else(|| self.error(&format!("label {} never marked", jump.label.id)))?;
            if let Insn::Jump(t) | Insn::JumpIfNull(t) = &mut self.code[jump.index] {
                *t = target;
            }
        }
        self.finalized = true;
        Ok(std::mem::take(&mut self.code))
    }

    fn error(&self, message: &str) -> WeaverError {
        WeaverError::Emit(format!("{}: {}", self.signature, message))
    }
}
