//! Type unit verification

use crate::descriptor::MethodSignature;
use crate::instruction::{decode_instructions, Instruction, Operands};
use crate::opcode::Opcode;
use crate::unit::{MethodDef, TypeUnit};
use std::collections::HashSet;

/// Unit verification errors
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Body failed to decode
    #[error("{method}: decode error: {message}")]
    Decode {
        /// Method key
        method: String,
        /// Decoder message
        message: String,
    },

    /// Method has no instructions
    #[error("{0}: empty body")]
    EmptyBody(String),

    /// Engine-only opcode in a supplied unit
    #[error("{method}: engine opcode {opcode} at offset {offset}")]
    EngineOpcode {
        /// Method key
        method: String,
        /// Opcode mnemonic
        opcode: &'static str,
        /// Byte offset
        offset: usize,
    },

    /// Invalid jump target
    #[error("{method}: invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Method key
        method: String,
        /// Computed target
        target: isize,
        /// Offset of the jump
        offset: usize,
    },

    /// Invalid constant pool reference
    #[error("{method}: invalid constant pool reference {index} at offset {offset}")]
    InvalidConstantRef {
        /// Method key
        method: String,
        /// Pool index
        index: u32,
        /// Byte offset
        offset: usize,
    },

    /// Constant does not hold a valid signature key
    #[error("{method}: {key:?} is not a signature key (offset {offset})")]
    InvalidSignature {
        /// Method key
        method: String,
        /// Offending constant
        key: String,
        /// Byte offset
        offset: usize,
    },

    /// Invalid local variable reference
    #[error("{method}: local {index} out of range (max {max}) at offset {offset}")]
    InvalidLocalRef {
        /// Method key
        method: String,
        /// Local index
        index: u16,
        /// Local count
        max: u16,
        /// Byte offset
        offset: usize,
    },

    /// Locals cannot hold the parameters
    #[error("{method}: {local_count} locals cannot hold {needed} argument slots")]
    InsufficientLocals {
        /// Method key
        method: String,
        /// Declared locals
        local_count: u16,
        /// Required slots
        needed: usize,
    },

    /// Execution falls off end
    #[error("{method}: execution falls off end at offset {offset}")]
    FallOffEnd {
        /// Method key
        method: String,
        /// Offset of the last instruction
        offset: usize,
    },

    /// Two methods share a signature key
    #[error("Duplicate method {0}")]
    DuplicateMethod(String),

    /// Two fields share a name
    #[error("Duplicate field {0}")]
    DuplicateField(String),
}

/// Which opcodes a unit may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Supplied by a compiler: engine opcodes are rejected
    Source,
    /// Produced by the rewriter: engine opcodes are allowed
    Rewritten,
}

/// Verify a unit's member tables and every method body
pub fn verify_unit(unit: &TypeUnit, mode: VerifyMode) -> Result<(), VerifyError> {
    let mut field_names = HashSet::new();
    for field in &unit.fields {
        if !field_names.insert(field.name.as_str()) {
            return Err(VerifyError::DuplicateField(field.name.clone()));
        }
    }

    let mut method_keys = HashSet::new();
    for method in &unit.methods {
        let key = method.key();
        if !method_keys.insert(key.clone()) {
            return Err(VerifyError::DuplicateMethod(key));
        }
        verify_method(unit, method, mode)?;
    }

    Ok(())
}

fn verify_method(unit: &TypeUnit, method: &MethodDef, mode: VerifyMode) -> Result<(), VerifyError> {
    let key = method.key();

    let needed = method.arg_slots();
    if usize::from(method.local_count) < needed {
        return Err(VerifyError::InsufficientLocals {
            method: key,
            local_count: method.local_count,
            needed,
        });
    }

    let instructions = decode_instructions(&method.code).map_err(|e| VerifyError::Decode {
        method: key.clone(),
        message: e.to_string(),
    })?;

    let last = match instructions.last() {
        Some(last) => *last,
        None => return Err(VerifyError::EmptyBody(key)),
    };

    let boundaries: HashSet<usize> = instructions.iter().map(|i| i.offset).collect();

    for instruction in &instructions {
        if mode == VerifyMode::Source && instruction.opcode.is_engine_only() {
            return Err(VerifyError::EngineOpcode {
                method: key,
                opcode: instruction.opcode.name(),
                offset: instruction.offset,
            });
        }

        if let Some(target) = instruction.jump_target() {
            if target < 0 || !boundaries.contains(&(target as usize)) {
                return Err(VerifyError::InvalidJumpTarget {
                    method: key,
                    target,
                    offset: instruction.offset,
                });
            }
        }

        if let Operands::Local(index) = instruction.operands {
            if index >= method.local_count {
                return Err(VerifyError::InvalidLocalRef {
                    method: key,
                    index,
                    max: method.local_count,
                    offset: instruction.offset,
                });
            }
        }

        verify_constant_refs(unit, &key, instruction)?;
    }

    if !last.opcode.is_terminator() {
        return Err(VerifyError::FallOffEnd {
            method: key,
            offset: last.offset,
        });
    }

    Ok(())
}

fn verify_constant_refs(
    unit: &TypeUnit,
    method: &str,
    instruction: &Instruction,
) -> Result<(), VerifyError> {
    use Opcode::*;

    let string_at = |index: u32| {
        unit.constants
            .get_string(index)
            .ok_or_else(|| VerifyError::InvalidConstantRef {
                method: method.to_string(),
                index,
                offset: instruction.offset,
            })
    };
    let signature_at = |index: u32| {
        let key = string_at(index)?;
        MethodSignature::parse_key(key)
            .map(|_| ())
            .map_err(|_| VerifyError::InvalidSignature {
                method: method.to_string(),
                key: key.to_string(),
                offset: instruction.offset,
            })
    };

    match (instruction.opcode, instruction.operands) {
        (ConstStr | New, Operands::Index(index)) => string_at(index).map(|_| ()),
        (InvokeClosure, Operands::Index(sig)) => signature_at(sig),
        (
            InvokeStatic | InvokeVirtual | InvokeDynamicStatic | InvokeDynamicVirtual,
            Operands::Pair(owner, sig),
        ) => {
            string_at(owner)?;
            signature_at(sig)
        }
        (GetField | PutField | GetExtField | PutExtField | GetEnclosing, Operands::Pair(owner, name)) => {
            string_at(owner)?;
            string_at(name).map(|_| ())
        }
        (GetFieldSlot | PutFieldSlot | GetCaptured, Operands::Pair(owner, _)) => {
            string_at(owner).map(|_| ())
        }
        (Dispatch, Operands::Dispatch { sig, .. }) => signature_at(sig),
        (MakeClosure | MakeCaptured, Operands::Closure { index, .. }) => {
            string_at(index).map(|_| ())
        }
        _ => Ok(()),
    }
}
