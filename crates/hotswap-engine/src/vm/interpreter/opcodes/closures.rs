//! Closure opcodes: capture sites, captured values and closure invocation

use crate::capture::{CaptureSite, SiteId};
use crate::executor::Executable;
use crate::object::ClosureInstance;
use crate::value::Value;
use crate::vm::interpreter::{Interpreter, OpcodeResult};
use crate::vm::{VmError, VmResult};
use hotswap_unit::{closure_flags, Instruction, Opcode, Operands};
use std::sync::Arc;

impl Interpreter<'_> {
    fn site(&self, id: &SiteId) -> VmResult<Arc<CaptureSite>> {
        self.registry()
            .sites()
            .get(id)
            .ok_or_else(|| VmError::Runtime(format!("capture site {} is not bound", id)))
    }

    pub(in crate::vm::interpreter) fn exec_closure_ops(
        &mut self,
        exec: &Executable,
        instruction: &Instruction,
    ) -> VmResult<OpcodeResult> {
        match (instruction.opcode, instruction.operands) {
            (Opcode::MakeCaptured, Operands::Closure { index, count, flags }) => {
                let key = Self::string_operand(exec, index)?;
                let id = SiteId::from_key(exec.type_id, key)
                    .ok_or_else(|| VmError::Runtime(format!("bad capture site key {:?}", key)))?;
                let site = self.site(&id)?;
                let host = self.type_by_id(site.host_id)?;
                Self::check_access(exec, &host)?;

                let mut values = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    values.push(self.stack.pop()?);
                }
                values.reverse();
                let enclosing = if flags & closure_flags::CAPTURES_THIS != 0 {
                    Some(self.stack.pop()?)
                } else {
                    None
                };

                let mut captured: Vec<Value> = site
                    .slots
                    .iter()
                    .map(|slot| Value::default_for(&slot.descriptor))
                    .collect();
                for (position, value) in values.into_iter().enumerate() {
                    let slot = site.slot_for(position).ok_or_else(|| {
                        VmError::Runtime(format!("{} has no position {}", id, position))
                    })?;
                    let descriptor = &site.slots[slot].descriptor;
                    if !value.conforms_to(descriptor) {
                        return Err(VmError::TypeError(format!(
                            "cannot capture {} as {}",
                            value.kind(),
                            descriptor
                        )));
                    }
                    captured[slot] = value;
                }

                let closure = ClosureInstance::new(id, enclosing, captured, self.registry().extensions());
                self.stack.push(Value::Closure(Arc::new(closure)))?;
            }

            (Opcode::GetCaptured, Operands::Pair(_, position)) => {
                let closure = self.pop_closure()?;
                let site = self.site(closure.site())?;
                let slot = site
                    .slot_at(exec.type_id, exec.version, position as usize)
                    .ok_or_else(|| {
                        VmError::Runtime(format!("{} has no position {}", closure.site(), position))
                    })?;
                // slots appended by a later host version read as defaults
                let value = match closure.captured(slot) {
                    Some(value) => value.clone(),
                    None => site
                        .slot_type(slot)
                        .map(Value::default_for)
                        .unwrap_or(Value::Null),
                };
                self.stack.push(value)?;
            }

            (Opcode::GetEnclosing, Operands::Pair(..)) => {
                let closure = self.pop_closure()?;
                let value = closure.enclosing().cloned().unwrap_or(Value::Null);
                self.stack.push(value)?;
            }

            (Opcode::InvokeClosure, Operands::Index(sig)) => {
                let (key, signature) = Self::signature_operand(exec, sig)?;
                let params = signature.param_count();
                let closure = match self.stack.peek_n(params)? {
                    Value::Closure(closure) => Arc::clone(closure),
                    Value::Null => return Err(VmError::NullPointer),
                    other => {
                        return Err(VmError::TypeError(format!(
                            "expected closure, found {}",
                            other.kind()
                        )))
                    }
                };
                let target = self.closure_target(&closure, key)?;
                return self.invoke(&target, params + 1);
            }

            (Opcode::MakeClosure, _) => {
                return Err(VmError::Unrewritten(instruction.opcode.name()));
            }

            (opcode, _) => {
                return Err(VmError::Runtime(format!(
                    "malformed {} instruction",
                    opcode.name()
                )))
            }
        }
        Ok(OpcodeResult::Continue)
    }
}
