//! Jumps and returns

use crate::value::Value;
use crate::vm::interpreter::{Interpreter, OpcodeResult};
use crate::vm::{VmError, VmResult};
use hotswap_unit::{Instruction, Opcode};

impl Interpreter<'_> {
    pub(in crate::vm::interpreter) fn exec_control_flow_ops(
        &mut self,
        code_len: usize,
        instruction: &Instruction,
    ) -> VmResult<OpcodeResult> {
        let jump = || {
            instruction
                .jump_target()
                .filter(|&target| target >= 0 && (target as usize) < code_len)
                .map(|target| OpcodeResult::Jump(target as usize))
                .ok_or_else(|| {
                    VmError::Runtime(format!("bad jump at offset {}", instruction.offset))
                })
        };

        match instruction.opcode {
            Opcode::Jmp => jump(),
            Opcode::JmpIfFalse | Opcode::JmpIfTrue => {
                let value = self.stack.pop()?;
                let condition = value.as_bool().ok_or_else(|| {
                    VmError::TypeError(format!("expected bool, found {}", value.kind()))
                })?;
                if condition == (instruction.opcode == Opcode::JmpIfTrue) {
                    jump()
                } else {
                    Ok(OpcodeResult::Continue)
                }
            }
            Opcode::Return => Ok(OpcodeResult::Return(self.stack.pop()?)),
            Opcode::ReturnVoid => Ok(OpcodeResult::Return(Value::Null)),
            opcode => Err(VmError::Runtime(format!(
                "{} is not a control flow opcode",
                opcode.name()
            ))),
        }
    }
}
