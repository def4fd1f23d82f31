//! Decoded instructions
//!
//! Bodies are decoded into a flat list of [`Instruction`]s, which the
//! verifier and the rewriter both walk.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::opcode::Opcode;

/// Operands of one instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operands {
    /// No operands
    None,
    /// Immediate i32
    I32(i32),
    /// Immediate i64
    I64(i64),
    /// Immediate f64
    F64(f64),
    /// Single constant-pool index
    Index(u32),
    /// Local slot
    Local(u16),
    /// Relative jump offset
    Jump(i32),
    /// Two constant-pool indices (owner/type + member), or owner + slot/position
    Pair(u32, u32),
    /// Signature index and argument count of a dispatcher
    Dispatch {
        /// Signature key constant
        sig: u32,
        /// Argument slots, receiver included
        argc: u16,
    },
    /// Closure creation
    Closure {
        /// Host name constant (`MakeClosure`) or site key constant (`MakeCaptured`)
        index: u32,
        /// Captured value count
        count: u8,
        /// `closure_flags` bits
        flags: u8,
    },
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// Byte offset of the opcode
    pub offset: usize,
    /// Opcode
    pub opcode: Opcode,
    /// Operands
    pub operands: Operands,
}

impl Instruction {
    /// Encoded length in bytes
    pub fn encoded_len(&self) -> usize {
        1 + self.opcode.operand_len()
    }

    /// Offset of the following instruction
    pub fn end(&self) -> usize {
        self.offset + self.encoded_len()
    }

    /// Absolute target of a jump, if this is one
    pub fn jump_target(&self) -> Option<isize> {
        match self.operands {
            Operands::Jump(rel) => Some(self.end() as isize + rel as isize),
            _ => None,
        }
    }

    /// Encode opcode and operands
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::with_capacity(self.encoded_len());
        writer.emit_opcode(self.opcode);
        match self.operands {
            Operands::None => {}
            Operands::I32(v) | Operands::Jump(v) => writer.emit_i32(v),
            Operands::I64(v) => writer.emit_i64(v),
            Operands::F64(v) => writer.emit_f64(v),
            Operands::Index(v) => writer.emit_u32(v),
            Operands::Local(v) => writer.emit_u16(v),
            Operands::Pair(a, b) => {
                writer.emit_u32(a);
                writer.emit_u32(b);
            }
            Operands::Dispatch { sig, argc } => {
                writer.emit_u32(sig);
                writer.emit_u16(argc);
            }
            Operands::Closure {
                index,
                count,
                flags,
            } => {
                writer.emit_u32(index);
                writer.emit_u8(count);
                writer.emit_u8(flags);
            }
        }
        writer.into_bytes()
    }

    /// Decode the instruction at the reader's position
    pub fn read(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        use Opcode::*;
        let offset = reader.position();
        let opcode = reader.read_opcode()?;
        let operands = match opcode {
            ConstI32 => Operands::I32(reader.read_i32()?),
            ConstI64 => Operands::I64(reader.read_i64()?),
            ConstF64 => Operands::F64(reader.read_f64()?),
            ConstStr | InvokeClosure | New => Operands::Index(reader.read_u32()?),
            LoadLocal | StoreLocal => Operands::Local(reader.read_u16()?),
            Jmp | JmpIfFalse | JmpIfTrue => Operands::Jump(reader.read_i32()?),
            InvokeStatic | InvokeVirtual | GetField | PutField | InvokeDynamicStatic
            | InvokeDynamicVirtual | GetFieldSlot | PutFieldSlot | GetExtField | PutExtField
            | GetCaptured | GetEnclosing => {
                let a = reader.read_u32()?;
                let b = reader.read_u32()?;
                Operands::Pair(a, b)
            }
            Dispatch => {
                let sig = reader.read_u32()?;
                let argc = reader.read_u16()?;
                Operands::Dispatch { sig, argc }
            }
            MakeClosure | MakeCaptured => {
                let index = reader.read_u32()?;
                let count = reader.read_u8()?;
                let flags = reader.read_u8()?;
                Operands::Closure {
                    index,
                    count,
                    flags,
                }
            }
            _ => Operands::None,
        };
        Ok(Self {
            offset,
            opcode,
            operands,
        })
    }
}

/// Decode a whole body
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(code);
    while reader.has_more() {
        instructions.push(Instruction::read(&mut reader)?);
    }
    Ok(instructions)
}

/// Overwrite the instruction at `replacement.offset` in place
///
/// The replacement must encode to the same length as the instruction it
/// replaces; returns `false` and leaves `code` untouched otherwise.
pub fn patch_instruction(code: &mut [u8], original: &Instruction, replacement: &Instruction) -> bool {
    if original.offset != replacement.offset || original.encoded_len() != replacement.encoded_len() {
        return false;
    }
    let bytes = replacement.encode();
    code[original.offset..original.end()].copy_from_slice(&bytes);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body() {
        let mut writer = BytecodeWriter::new();
        writer.emit_load_local(0);
        writer.emit_get_field(1, 2);
        writer.emit_make_closure(3, 1, 0);
        writer.emit_return();

        let instructions = decode_instructions(writer.buffer()).unwrap();
        assert_eq!(instructions.len(), 4);
        assert_eq!(instructions[1].opcode, Opcode::GetField);
        assert_eq!(instructions[1].operands, Operands::Pair(1, 2));
        assert_eq!(instructions[1].offset, 3);
        assert_eq!(
            instructions[2].operands,
            Operands::Closure {
                index: 3,
                count: 1,
                flags: 0
            }
        );
        assert_eq!(instructions[3].end(), writer.offset());
    }

    #[test]
    fn test_encode_matches_writer() {
        let mut writer = BytecodeWriter::new();
        writer.emit_invoke_static(4, 9);
        let instruction = decode_instructions(writer.buffer()).unwrap()[0];
        assert_eq!(instruction.encode(), writer.buffer());
    }

    #[test]
    fn test_patch_in_place() {
        let mut writer = BytecodeWriter::new();
        writer.emit_const_i32(1);
        writer.emit_get_field(1, 2);
        writer.emit_return();
        let mut code = writer.into_bytes();

        let original = decode_instructions(&code).unwrap()[1];
        let replacement = Instruction {
            opcode: Opcode::GetFieldSlot,
            operands: Operands::Pair(1, 0),
            ..original
        };
        assert!(patch_instruction(&mut code, &original, &replacement));

        let decoded = decode_instructions(&code).unwrap();
        assert_eq!(decoded[1].opcode, Opcode::GetFieldSlot);
        assert_eq!(decoded[2].opcode, Opcode::Return);
    }

    #[test]
    fn test_patch_rejects_size_change() {
        let mut writer = BytecodeWriter::new();
        writer.emit_new(1);
        let mut code = writer.into_bytes();
        let original = decode_instructions(&code).unwrap()[0];
        let replacement = Instruction {
            opcode: Opcode::Pop,
            operands: Operands::None,
            ..original
        };
        assert!(!patch_instruction(&mut code, &original, &replacement));
    }

    #[test]
    fn test_jump_target() {
        let mut writer = BytecodeWriter::new();
        let patch = writer.emit_jump(Opcode::Jmp);
        writer.emit_const_i32(0);
        writer.bind_jump(patch);
        writer.emit_return_void();

        let instructions = decode_instructions(writer.buffer()).unwrap();
        assert_eq!(instructions[0].jump_target(), Some(instructions[2].offset as isize));
    }
}
