//! Interpreter for code bodies
//!
//! Executes the instruction lists of bridges, forwarding constructors and
//! generated overrides. The operand stack holds values and callbacks; the
//! receiver and arguments of the running frame are addressed directly.

use std::sync::Arc;

use weaver_image::{Insn, InvokeKind};

use crate::callback::Callback;
use crate::emit::dispatch::dispatch_callback;
use crate::error::{InvokeError, InvokeResult};
use crate::runtime::class::{CallContext, MethodBody, MethodDef};
use crate::runtime::convert::{checkcast, coerce_return};
use crate::runtime::object::ObjectRef;
use crate::runtime::value::Value;

/// Operand stack entry
enum Operand {
    Value(Value),
    Callback(Arc<dyn Callback>),
}

impl Operand {
    fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }
}

/// Run a linked method on `this`
pub(crate) fn run_method(
    method: &MethodDef,
    this: &ObjectRef,
    args: &[Value],
    caller: Option<&str>,
) -> InvokeResult<Value> {
    let expected = method.signature.params().len();
    if args.len() != expected {
        return Err(InvokeError::ArgumentCount {
            signature: method.signature.to_string(),
            expected,
            actual: args.len(),
        });
    }

    match &method.body {
        MethodBody::Native(body) => body(&CallContext {
            this,
            args,
            caller,
            method,
        }),
        MethodBody::Code(code) => execute(method, code, this, args, caller),
        MethodBody::Abstract => Err(InvokeError::AbstractMethod {
            owner: method.owner.to_string(),
            signature: method.signature.to_string(),
        }),
    }
}

fn execute(
    method: &MethodDef,
    code: &[Insn],
    this: &ObjectRef,
    args: &[Value],
    caller: Option<&str>,
) -> InvokeResult<Value> {
    let mut stack: Vec<Operand> = Vec::with_capacity(4 + args.len());
    let mut pc = 0usize;

    loop {
        let insn = code.get(pc).ok_or_else(|| {
            InvokeError::IllegalState(format!("{}: execution fell off end of code", method.signature))
        })?;
        pc += 1;

        match insn {
            Insn::LoadThis => stack.push(Operand::Value(Value::Object(this.clone()))),
            Insn::LoadArg(index) => {
                let arg = args.get(*index as usize).cloned().ok_or_else(|| {
                    InvokeError::IllegalState(format!("argument {} out of range", index))
                })?;
                stack.push(Operand::Value(arg));
            }
            Insn::LoadCallback(slot) => match this.callback_slot(*slot as usize) {
                Some(callback) => stack.push(Operand::Callback(callback)),
                None => stack.push(Operand::Value(Value::Null)),
            },
            Insn::Dup => {
                let top = match stack.last() {
                    Some(Operand::Value(v)) => Operand::Value(v.clone()),
                    Some(Operand::Callback(c)) => Operand::Callback(c.clone()),
                    None => return Err(underflow(method)),
                };
                stack.push(top);
            }
            Insn::Pop => {
                pop(&mut stack, method)?;
            }
            Insn::Jump(target) => pc = *target as usize,
            Insn::JumpIfNull(target) => {
                if pop(&mut stack, method)?.is_null() {
                    pc = *target as usize;
                }
            }
            Insn::Invoke {
                kind,
                owner,
                signature,
            } => {
                let count = signature.params().len();
                if stack.len() < count + 1 {
                    return Err(underflow(method));
                }
                let call_args = stack
                    .split_off(stack.len() - count)
                    .into_iter()
                    .map(|operand| pop_value(operand, method))
                    .collect::<InvokeResult<Vec<_>>>()?;
                let receiver = match pop(&mut stack, method)? {
                    Operand::Value(Value::Object(obj)) => obj,
                    Operand::Value(Value::Null) => {
                        return Err(InvokeError::NullPointer(signature.to_string()))
                    }
                    Operand::Value(other) => {
                        return Err(InvokeError::ClassCast {
                            from: other.type_name(),
                            to: owner.clone(),
                        })
                    }
                    Operand::Callback(_) => return Err(callback_misuse(method)),
                };

                let from = Some(&*method.owner);
                let result = match kind {
                    InvokeKind::Special => {
                        receiver.invoke_special(from, owner, signature, &call_args)?
                    }
                    InvokeKind::Virtual | InvokeKind::Interface => {
                        receiver.invoke_from(from, signature, &call_args)?
                    }
                };
                if !signature.return_type().is_void() {
                    stack.push(Operand::Value(result));
                }
            }
            Insn::InvokeCallback { method: index } => {
                let callback = match pop(&mut stack, method)? {
                    Operand::Callback(callback) => callback,
                    Operand::Value(_) => return Err(callback_misuse(method)),
                };
                let generated = this.generated_type().ok_or_else(|| {
                    InvokeError::IllegalState(format!(
                        "{} is not a generated type",
                        this.class_name()
                    ))
                })?;
                let result = dispatch_callback(generated, *index as usize, &callback, this, args, caller)?;
                stack.push(Operand::Value(result));
            }
            Insn::Checkcast(ty) => {
                let value = pop_value(pop(&mut stack, method)?, method)?;
                stack.push(Operand::Value(checkcast(value, ty)?));
            }
            Insn::CoerceReturn(ty) => {
                let value = pop_value(pop(&mut stack, method)?, method)?;
                stack.push(Operand::Value(coerce_return(value, ty)?));
            }
            Insn::Return => return pop_value(pop(&mut stack, method)?, method),
            Insn::ReturnVoid => return Ok(Value::Void),
            Insn::ThrowAbstract => return Err(abstract_error(method, this)),
        }
    }
}

fn pop(stack: &mut Vec<Operand>, method: &MethodDef) -> InvokeResult<Operand> {
    stack.pop().ok_or_else(|| underflow(method))
}

fn pop_value(operand: Operand, method: &MethodDef) -> InvokeResult<Value> {
    match operand {
        Operand::Value(value) => Ok(value),
        Operand::Callback(_) => Err(callback_misuse(method)),
    }
}

fn underflow(method: &MethodDef) -> InvokeError {
    InvokeError::IllegalState(format!("{}: operand stack underflow", method.signature))
}

fn callback_misuse(method: &MethodDef) -> InvokeError {
    InvokeError::IllegalState(format!("{}: callback used as a value", method.signature))
}

/// Report the original method when an access method reaches an abstract body
fn abstract_error(method: &MethodDef, this: &ObjectRef) -> InvokeError {
    let original = this
        .generated_type()
        .and_then(|generated| generated.method_for_access(&method.signature));
    match original {
        Some(intercepted) => InvokeError::AbstractMethod {
            owner: intercepted.record.owner.to_string(),
            signature: intercepted.record.signature.to_string(),
        },
        None => InvokeError::AbstractMethod {
            owner: method.owner.to_string(),
            signature: method.signature.to_string(),
        },
    }
}
