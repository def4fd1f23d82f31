//! Bytecode encoding and decoding utilities
//!
//! `BytecodeWriter` emits opcodes, operands and the length-prefixed
//! strings used by the unit format; `BytecodeReader` reads them back with
//! bounds checking on every access.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that can occur during bytecode decoding
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Unexpected end of bytecode stream
    #[error("Unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("Invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Invalid opcode
    #[error("Invalid opcode {0:#04x} at offset {1}")]
    InvalidOpcode(u8, usize),
}

/// Bytecode writer for encoding instructions and unit sections
#[derive(Debug, Default)]
pub struct BytecodeWriter {
    pub(crate) buffer: Vec<u8>,
}

impl BytecodeWriter {
    /// Create a new bytecode writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new bytecode writer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Get the current bytecode buffer
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the bytecode buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get the current offset (length of bytecode)
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    // ===== Basic Emission =====

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 16-bit unsigned integer (little-endian)
    pub fn emit_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit unsigned integer (little-endian)
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit signed integer (little-endian)
    pub fn emit_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer (little-endian)
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float (little-endian)
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Emit a length-prefixed byte blob
    pub fn emit_blob(&mut self, value: &[u8]) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value);
    }

    /// Emit an opcode without operands
    pub fn emit_opcode(&mut self, opcode: Opcode) {
        self.emit_u8(opcode.to_u8());
    }

    // ===== Constants & Locals =====

    /// Emit CONST_I32 instruction with value
    pub fn emit_const_i32(&mut self, value: i32) {
        self.emit_opcode(Opcode::ConstI32);
        self.emit_i32(value);
    }

    /// Emit CONST_I64 instruction with value
    pub fn emit_const_i64(&mut self, value: i64) {
        self.emit_opcode(Opcode::ConstI64);
        self.emit_i64(value);
    }

    /// Emit CONST_F64 instruction with value
    pub fn emit_const_f64(&mut self, value: f64) {
        self.emit_opcode(Opcode::ConstF64);
        self.emit_f64(value);
    }

    /// Emit CONST_STR instruction with constant pool index
    pub fn emit_const_str(&mut self, index: u32) {
        self.emit_opcode(Opcode::ConstStr);
        self.emit_u32(index);
    }

    /// Emit LOAD_LOCAL instruction
    pub fn emit_load_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::LoadLocal);
        self.emit_u16(index);
    }

    /// Emit STORE_LOCAL instruction
    pub fn emit_store_local(&mut self, index: u16) {
        self.emit_opcode(Opcode::StoreLocal);
        self.emit_u16(index);
    }

    // ===== Control Flow =====

    /// Emit a jump opcode with a placeholder offset; returns the patch offset
    pub fn emit_jump(&mut self, opcode: Opcode) -> usize {
        debug_assert!(opcode.is_jump());
        self.emit_opcode(opcode);
        self.reserve_i32()
    }

    /// Point a previously emitted jump at the current offset
    pub fn bind_jump(&mut self, patch_offset: usize) {
        let target = self.offset() as i32;
        let relative = target - (patch_offset as i32 + 4);
        self.patch_i32(patch_offset, relative);
    }

    /// Emit RETURN instruction
    pub fn emit_return(&mut self) {
        self.emit_opcode(Opcode::Return);
    }

    /// Emit RETURN_VOID instruction
    pub fn emit_return_void(&mut self) {
        self.emit_opcode(Opcode::ReturnVoid);
    }

    // ===== Invocation & Objects =====

    /// Emit INVOKE_STATIC with type and signature constant indices
    pub fn emit_invoke_static(&mut self, type_index: u32, sig_index: u32) {
        self.emit_opcode(Opcode::InvokeStatic);
        self.emit_u32(type_index);
        self.emit_u32(sig_index);
    }

    /// Emit INVOKE_VIRTUAL with owner and signature constant indices
    pub fn emit_invoke_virtual(&mut self, owner_index: u32, sig_index: u32) {
        self.emit_opcode(Opcode::InvokeVirtual);
        self.emit_u32(owner_index);
        self.emit_u32(sig_index);
    }

    /// Emit INVOKE_CLOSURE with a signature constant index
    pub fn emit_invoke_closure(&mut self, sig_index: u32) {
        self.emit_opcode(Opcode::InvokeClosure);
        self.emit_u32(sig_index);
    }

    /// Emit NEW with a type constant index
    pub fn emit_new(&mut self, type_index: u32) {
        self.emit_opcode(Opcode::New);
        self.emit_u32(type_index);
    }

    /// Emit GET_FIELD with owner and field name constant indices
    pub fn emit_get_field(&mut self, owner_index: u32, name_index: u32) {
        self.emit_opcode(Opcode::GetField);
        self.emit_u32(owner_index);
        self.emit_u32(name_index);
    }

    /// Emit PUT_FIELD with owner and field name constant indices
    pub fn emit_put_field(&mut self, owner_index: u32, name_index: u32) {
        self.emit_opcode(Opcode::PutField);
        self.emit_u32(owner_index);
        self.emit_u32(name_index);
    }

    /// Emit MAKE_CLOSURE with host constant index, capture count and flags
    pub fn emit_make_closure(&mut self, host_index: u32, capture_count: u8, flags: u8) {
        self.emit_opcode(Opcode::MakeClosure);
        self.emit_u32(host_index);
        self.emit_u8(capture_count);
        self.emit_u8(flags);
    }

    /// Emit DISPATCH with signature constant index and argument count
    pub fn emit_dispatch(&mut self, sig_index: u32, argc: u16) {
        self.emit_opcode(Opcode::Dispatch);
        self.emit_u32(sig_index);
        self.emit_u16(argc);
    }

    // ===== Patching =====

    /// Reserve 4 bytes for a later patch and return their offset
    pub fn reserve_i32(&mut self) -> usize {
        let offset = self.offset();
        self.emit_i32(0);
        offset
    }

    /// Overwrite a 32-bit signed integer at an offset
    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrite a 32-bit unsigned integer at an offset
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// Bytecode reader for decoding instructions and unit sections
pub struct BytecodeReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a new reader over a byte slice
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Check whether any bytes remain
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    /// Move the read position
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.position + N;
        let slice = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(slice);
        self.position = end;
        Ok(bytes)
    }

    /// Read a byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a 16-bit unsigned integer (little-endian)
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit unsigned integer (little-endian)
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Read a 32-bit signed integer (little-endian)
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit signed integer (little-endian)
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    /// Read a 64-bit float (little-endian)
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    /// Read a length-prefixed string (u32 length + UTF-8 bytes)
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let start = self.position;
        let bytes = self.read_blob()?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Read a length-prefixed byte blob
    pub fn read_blob(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Read a fixed number of bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, DecodeError> {
        let end = self
            .position
            .checked_add(count)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?;
        let bytes = self
            .buffer
            .get(self.position..end)
            .ok_or(DecodeError::UnexpectedEnd(self.position))?
            .to_vec();
        self.position = end;
        Ok(bytes)
    }

    /// Read an opcode
    pub fn read_opcode(&mut self) -> Result<Opcode, DecodeError> {
        let byte = self.read_u8()?;
        Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, self.position - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_emission() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u8(0x42);
        writer.emit_u16(0x1234);
        writer.emit_u32(0xABCD_EF01);

        let bytes = writer.buffer();
        assert_eq!(bytes[0], 0x42);
        assert_eq!(bytes[1], 0x34); // Little-endian
        assert_eq!(bytes[2], 0x12);
        assert_eq!(bytes[3], 0x01);
        assert_eq!(bytes[6], 0xAB);
    }

    #[test]
    fn test_jump_binding() {
        let mut writer = BytecodeWriter::new();
        let patch = writer.emit_jump(Opcode::JmpIfFalse);
        writer.emit_const_i32(42);
        writer.bind_jump(patch);

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_opcode().unwrap(), Opcode::JmpIfFalse);
        // Skips exactly the CONST_I32 instruction
        assert_eq!(reader.read_i32().unwrap(), 5);
    }

    #[test]
    fn test_reader_bounds_checking() {
        let bytes = vec![0x01, 0x02];
        let mut reader = BytecodeReader::new(&bytes);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u8().unwrap(), 0x02);
        assert_eq!(reader.read_u8(), Err(DecodeError::UnexpectedEnd(2)));
    }

    #[test]
    fn test_reader_string() {
        let mut writer = BytecodeWriter::new();
        writer.emit_string("hello");

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert!(!reader.has_more());
    }

    #[test]
    fn test_reader_rejects_oversized_length() {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(u32::MAX);

        let mut reader = BytecodeReader::new(writer.buffer());
        assert!(matches!(reader.read_blob(), Err(DecodeError::UnexpectedEnd(_))));
    }

    #[test]
    fn test_reader_invalid_opcode() {
        let bytes = vec![0xFF];
        let mut reader = BytecodeReader::new(&bytes);
        assert_eq!(reader.read_opcode(), Err(DecodeError::InvalidOpcode(0xFF, 0)));
    }

    #[test]
    fn test_instruction_sequence() {
        let mut writer = BytecodeWriter::new();
        writer.emit_const_i64(-7);
        writer.emit_load_local(5);
        writer.emit_opcode(Opcode::Ladd);
        writer.emit_return();

        let mut reader = BytecodeReader::new(writer.buffer());
        assert_eq!(reader.read_opcode().unwrap(), Opcode::ConstI64);
        assert_eq!(reader.read_i64().unwrap(), -7);
        assert_eq!(reader.read_opcode().unwrap(), Opcode::LoadLocal);
        assert_eq!(reader.read_u16().unwrap(), 5);
        assert_eq!(reader.read_opcode().unwrap(), Opcode::Ladd);
        assert_eq!(reader.read_opcode().unwrap(), Opcode::Return);
    }
}
