//! Invocation opcodes: Dispatch, InvokeStatic, InvokeVirtual and their dynamic forms

use crate::executor::Executable;
use crate::reloadable::ReloadableType;
use crate::value::Value;
use crate::vm::interpreter::{Interpreter, OpcodeResult};
use crate::vm::{VmError, VmResult};
use hotswap_unit::{Instruction, Opcode, Operands};
use std::sync::Arc;

impl Interpreter<'_> {
    /// Type of the receiver sitting under `argc - 1` arguments
    fn receiver_type(&self, owner: &str, argc: usize) -> VmResult<Arc<ReloadableType>> {
        match self.stack.peek_n(argc - 1)? {
            Value::Object(object) if object.type_name() == owner => {
                Ok(Arc::clone(object.reloadable_type()))
            }
            Value::Object(object) => Err(VmError::TypeError(format!(
                "receiver is a {}, expected {}",
                object.type_name(),
                owner
            ))),
            Value::Null => Err(VmError::NullPointer),
            other => Err(VmError::TypeError(format!(
                "receiver is a {}, expected {}",
                other.kind(),
                owner
            ))),
        }
    }

    pub(in crate::vm::interpreter) fn exec_call_ops(
        &mut self,
        exec: &Executable,
        instruction: &Instruction,
    ) -> VmResult<OpcodeResult> {
        match (instruction.opcode, instruction.operands) {
            (Opcode::Dispatch, Operands::Dispatch { sig, argc }) => {
                let key = Self::string_operand(exec, sig)?;
                // one table load per call; a concurrent reload shows up on the next one
                let ty = self.type_by_id(exec.type_id)?;
                let target = ty.current_executable(key)?;
                self.invoke(&target, usize::from(argc))
            }

            (Opcode::InvokeStatic, Operands::Pair(owner, sig)) => {
                let ty = self.resolve_type(Self::string_operand(exec, owner)?)?;
                Self::check_access(exec, &ty)?;
                let target = Self::dispatcher(&ty, Self::string_operand(exec, sig)?)?;
                Self::expect_kind(&target, true)?;
                self.invoke(&target, target.arg_slots())
            }

            (Opcode::InvokeVirtual, Operands::Pair(owner, sig)) => {
                let owner = Self::string_operand(exec, owner)?;
                let (key, signature) = Self::signature_operand(exec, sig)?;
                let argc = signature.param_count() + 1;
                let ty = self.receiver_type(owner, argc)?;
                Self::check_access(exec, &ty)?;
                let target = Self::dispatcher(&ty, key)?;
                Self::expect_kind(&target, false)?;
                self.invoke(&target, argc)
            }

            (Opcode::InvokeDynamicStatic, Operands::Pair(owner, sig)) => {
                let ty = self.resolve_type(Self::string_operand(exec, owner)?)?;
                Self::check_access(exec, &ty)?;
                let target = ty.current_executable(Self::string_operand(exec, sig)?)?;
                Self::expect_kind(&target, true)?;
                self.invoke(&target, target.arg_slots())
            }

            (Opcode::InvokeDynamicVirtual, Operands::Pair(owner, sig)) => {
                let owner = Self::string_operand(exec, owner)?;
                let (key, signature) = Self::signature_operand(exec, sig)?;
                let argc = signature.param_count() + 1;
                let ty = self.receiver_type(owner, argc)?;
                Self::check_access(exec, &ty)?;
                let target = ty.current_executable(key)?;
                Self::expect_kind(&target, false)?;
                self.invoke(&target, argc)
            }

            (opcode, _) => Err(VmError::Runtime(format!(
                "malformed {} instruction",
                opcode.name()
            ))),
        }
    }
}
