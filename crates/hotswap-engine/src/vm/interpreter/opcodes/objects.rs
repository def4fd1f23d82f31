//! Object opcodes: allocation, baseline slots and extension fields

use crate::executor::Executable;
use crate::object::Instance;
use crate::value::Value;
use crate::vm::interpreter::{Interpreter, OpcodeResult};
use crate::vm::{VmError, VmResult};
use hotswap_unit::{Instruction, Opcode, Operands, TypeDesc};
use std::sync::Arc;

fn expect_owner(object: &Instance, owner: &str) -> VmResult<()> {
    if object.type_name() == owner {
        Ok(())
    } else {
        Err(VmError::TypeError(format!(
            "field owner is {}, object is a {}",
            owner,
            object.type_name()
        )))
    }
}

fn check_store(
    object: &Instance,
    field: &str,
    descriptor: Option<&TypeDesc>,
    value: &Value,
) -> VmResult<()> {
    match descriptor {
        Some(descriptor) if value.conforms_to(descriptor) => Ok(()),
        Some(descriptor) => Err(VmError::TypeError(format!(
            "cannot store {} in {}.{} of type {}",
            value.kind(),
            object.type_name(),
            field,
            descriptor
        ))),
        None => Err(VmError::NoSuchField {
            type_name: object.type_name().to_string(),
            field: field.to_string(),
        }),
    }
}

impl Interpreter<'_> {
    pub(in crate::vm::interpreter) fn exec_object_ops(
        &mut self,
        exec: &Executable,
        instruction: &Instruction,
    ) -> VmResult<OpcodeResult> {
        match (instruction.opcode, instruction.operands) {
            (Opcode::New, Operands::Index(owner)) => {
                let ty = self.resolve_type(Self::string_operand(exec, owner)?)?;
                Self::check_access(exec, &ty)?;
                if ty.is_closure_host() {
                    return Err(VmError::TypeError(format!(
                        "{} hosts a closure and cannot be allocated",
                        ty.name()
                    )));
                }
                let object = Instance::new(ty, self.registry().extensions());
                self.stack.push(Value::Object(Arc::new(object)))?;
            }

            (Opcode::GetFieldSlot, Operands::Pair(owner, slot)) => {
                let owner = Self::string_operand(exec, owner)?;
                let object = self.pop_instance()?;
                expect_owner(&object, owner)?;
                let value = object.get_slot(slot as usize).ok_or_else(|| {
                    VmError::Runtime(format!("{} has no slot {}", owner, slot))
                })?;
                self.stack.push(value)?;
            }

            (Opcode::PutFieldSlot, Operands::Pair(owner, slot)) => {
                let owner = Self::string_operand(exec, owner)?;
                let value = self.stack.pop()?;
                let object = self.pop_instance()?;
                expect_owner(&object, owner)?;
                let layout = object.reloadable_type().layout();
                let field = layout
                    .fields()
                    .get(slot as usize)
                    .map(|(name, _)| name.as_str())
                    .unwrap_or("?");
                check_store(&object, field, layout.slot_type(slot as usize), &value)?;
                object.set_slot(slot as usize, value);
            }

            (Opcode::GetExtField, Operands::Pair(owner, name)) => {
                let owner = Self::string_operand(exec, owner)?;
                let name = Self::string_operand(exec, name)?;
                let object = self.pop_instance()?;
                expect_owner(&object, owner)?;
                let value = object.get_field(name).ok_or_else(|| VmError::NoSuchField {
                    type_name: owner.to_string(),
                    field: name.to_string(),
                })?;
                self.stack.push(value)?;
            }

            (Opcode::PutExtField, Operands::Pair(owner, name)) => {
                let owner = Self::string_operand(exec, owner)?;
                let name = Self::string_operand(exec, name)?;
                let value = self.stack.pop()?;
                let object = self.pop_instance()?;
                expect_owner(&object, owner)?;
                let descriptor = object.reloadable_type().field_type(name);
                check_store(&object, name, descriptor.as_ref(), &value)?;
                object.set_field(name, value);
            }

            (Opcode::GetField | Opcode::PutField, _) => {
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
