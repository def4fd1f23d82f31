//! Arithmetic, comparison and logical opcodes

use crate::value::Value;
use crate::vm::interpreter::{Interpreter, OpcodeResult};
use crate::vm::{VmError, VmResult};
use hotswap_unit::{Instruction, Opcode};

impl Interpreter<'_> {
    fn pop_i32(&mut self) -> VmResult<i32> {
        let value = self.stack.pop()?;
        value
            .as_i32()
            .ok_or_else(|| VmError::TypeError(format!("expected i32, found {}", value.kind())))
    }

    fn pop_i64(&mut self) -> VmResult<i64> {
        let value = self.stack.pop()?;
        value
            .as_i64()
            .ok_or_else(|| VmError::TypeError(format!("expected i64, found {}", value.kind())))
    }

    fn pop_f64(&mut self) -> VmResult<f64> {
        match self.stack.pop()? {
            Value::F64(v) => Ok(v),
            other => Err(VmError::TypeError(format!("expected f64, found {}", other.kind()))),
        }
    }

    fn pop_bool(&mut self) -> VmResult<bool> {
        let value = self.stack.pop()?;
        value
            .as_bool()
            .ok_or_else(|| VmError::TypeError(format!("expected bool, found {}", value.kind())))
    }

    /// Pop two integers of the same width, widened
    fn pop_int_pair(&mut self) -> VmResult<(i64, i64)> {
        let b = self.stack.pop()?;
        let a = self.stack.pop()?;
        match (&a, &b) {
            (Value::I32(a), Value::I32(b)) => Ok((i64::from(*a), i64::from(*b))),
            (Value::I64(a), Value::I64(b)) => Ok((*a, *b)),
            _ => Err(VmError::TypeError(format!(
                "cannot compare {} with {}",
                a.kind(),
                b.kind()
            ))),
        }
    }

    pub(in crate::vm::interpreter) fn exec_arithmetic_ops(
        &mut self,
        instruction: &Instruction,
    ) -> VmResult<OpcodeResult> {
        let result = match instruction.opcode {
            // =========================================================
            // Integer Arithmetic
            // =========================================================
            Opcode::Iadd => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                Value::I32(a.wrapping_add(b))
            }
            Opcode::Isub => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                Value::I32(a.wrapping_sub(b))
            }
            Opcode::Imul => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                Value::I32(a.wrapping_mul(b))
            }
            Opcode::Idiv => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Value::I32(a.wrapping_div(b))
            }
            Opcode::Imod => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Value::I32(a.wrapping_rem(b))
            }
            Opcode::Ineg => Value::I32(self.pop_i32()?.wrapping_neg()),

            Opcode::Ladd => {
                let b = self.pop_i64()?;
                let a = self.pop_i64()?;
                Value::I64(a.wrapping_add(b))
            }
            Opcode::Lsub => {
                let b = self.pop_i64()?;
                let a = self.pop_i64()?;
                Value::I64(a.wrapping_sub(b))
            }
            Opcode::Lmul => {
                let b = self.pop_i64()?;
                let a = self.pop_i64()?;
                Value::I64(a.wrapping_mul(b))
            }
            Opcode::Ldiv => {
                let b = self.pop_i64()?;
                let a = self.pop_i64()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                Value::I64(a.wrapping_div(b))
            }
            Opcode::I2l => Value::I64(i64::from(self.pop_i32()?)),

            // =========================================================
            // Float Arithmetic
            // =========================================================
            Opcode::Fadd => {
                let b = self.pop_f64()?;
                let a = self.pop_f64()?;
                Value::F64(a + b)
            }
            Opcode::Fsub => {
                let b = self.pop_f64()?;
                let a = self.pop_f64()?;
                Value::F64(a - b)
            }
            Opcode::Fmul => {
                let b = self.pop_f64()?;
                let a = self.pop_f64()?;
                Value::F64(a * b)
            }
            Opcode::Fdiv => {
                let b = self.pop_f64()?;
                let a = self.pop_f64()?;
                Value::F64(a / b)
            }

            // =========================================================
            // Comparison & Logical
            // =========================================================
            Opcode::Ieq | Opcode::Ine | Opcode::Ilt | Opcode::Ile | Opcode::Igt | Opcode::Ige => {
                let (a, b) = self.pop_int_pair()?;
                Value::Bool(match instruction.opcode {
                    Opcode::Ieq => a == b,
                    Opcode::Ine => a != b,
                    Opcode::Ilt => a < b,
                    Opcode::Ile => a <= b,
                    Opcode::Igt => a > b,
                    _ => a >= b,
                })
            }
            Opcode::Not => Value::Bool(!self.pop_bool()?),

            opcode => {
                return Err(VmError::Runtime(format!(
                    "{} is not an arithmetic opcode",
                    opcode.name()
                )))
            }
        };
        self.stack.push(result)?;
        Ok(OpcodeResult::Continue)
    }
}
