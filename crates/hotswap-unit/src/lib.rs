//! Hotswap type unit definitions
//!
//! This crate provides the binary type unit format, its instruction set,
//! constant pool and descriptors, and the verifier that gates every unit
//! before the engine rewrites it.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod constants;
pub mod descriptor;
pub mod encoder;
pub mod instruction;
pub mod opcode;
pub mod unit;
pub mod verify;

pub use builder::{BodyBuilder, UnitBuilder};
pub use constants::ConstantPool;
pub use descriptor::{DescriptorError, MethodDescriptor, MethodSignature, TypeDesc};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::{decode_instructions, patch_instruction, Instruction, Operands};
pub use opcode::{closure_flags, Opcode};
pub use unit::{
    access, enclosing_type_of, field_flags, method_flags, package_of, Attribute, FieldDef,
    MethodDef, MethodSummary, TypeDescriptor, TypeUnit, UnitError,
};
pub use verify::{verify_unit, VerifyError, VerifyMode};
