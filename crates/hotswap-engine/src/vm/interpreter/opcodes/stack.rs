//! Stack, constant and local variable opcodes

use crate::executor::Executable;
use crate::value::Value;
use crate::vm::interpreter::{Interpreter, OpcodeResult};
use crate::vm::{VmError, VmResult};
use hotswap_unit::{Instruction, Opcode, Operands};

impl Interpreter<'_> {
    pub(in crate::vm::interpreter) fn exec_stack_ops(
        &mut self,
        exec: &Executable,
        instruction: &Instruction,
    ) -> VmResult<OpcodeResult> {
        match (instruction.opcode, instruction.operands) {
            (Opcode::Nop, _) => {}
            (Opcode::Pop, _) => {
                self.stack.pop()?;
            }
            (Opcode::Dup, _) => {
                let top = self.stack.peek_n(0)?.clone();
                self.stack.push(top)?;
            }
            (Opcode::Swap, _) => {
                let b = self.stack.pop()?;
                let a = self.stack.pop()?;
                self.stack.push(b)?;
                self.stack.push(a)?;
            }

            (Opcode::ConstNull, _) => self.stack.push(Value::Null)?,
            (Opcode::ConstTrue, _) => self.stack.push(Value::Bool(true))?,
            (Opcode::ConstFalse, _) => self.stack.push(Value::Bool(false))?,
            (Opcode::ConstI32, Operands::I32(v)) => self.stack.push(Value::I32(v))?,
            (Opcode::ConstI64, Operands::I64(v)) => self.stack.push(Value::I64(v))?,
            (Opcode::ConstF64, Operands::F64(v)) => self.stack.push(Value::F64(v))?,
            (Opcode::ConstStr, Operands::Index(index)) => {
                let s = Self::string_operand(exec, index)?;
                self.stack.push(Value::string(s))?;
            }

            (Opcode::LoadLocal, Operands::Local(index)) => {
                let value = self.stack.load_local(usize::from(index))?;
                self.stack.push(value)?;
            }
            (Opcode::StoreLocal, Operands::Local(index)) => {
                let value = self.stack.pop()?;
                self.stack.store_local(usize::from(index), value)?;
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
