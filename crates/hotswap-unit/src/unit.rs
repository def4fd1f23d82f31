//! Type unit format
//!
//! A type unit is the binary definition of one version of one type:
//! its name, supertype, access flags, constant pool, fields, methods and
//! free-form attributes.
//!
//! Layout:
//! - Header: magic `HSWP` (4 bytes) + format version (u32) + flags (u32) + checksum (u32)
//! - Name, supertype (optional), access flags
//! - Constant pool
//! - Field table
//! - Method table
//! - Attribute table
//!
//! The checksum is the CRC32 of everything after the 16-byte header.

use crate::constants::ConstantPool;
use crate::descriptor::{DescriptorError, MethodSignature, TypeDesc};
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Magic number for type units: "HSWP"
pub const MAGIC: [u8; 4] = *b"HSWP";

/// Current unit format version
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 16;

/// Unit encoding/decoding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Descriptor error
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Invalid magic number
    #[error("Invalid magic number: expected HSWP, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        actual: u32,
    },

    /// Bytes remain after the attribute table
    #[error("{0} trailing bytes after unit body")]
    TrailingBytes(usize),

    /// Empty type name
    #[error("Type unit has an empty name")]
    EmptyName,
}

/// Unit access flags
pub mod access {
    /// Accessible from anywhere
    pub const PUBLIC: u32 = 1 << 0;
    /// Accessible only from the enclosing type
    pub const PRIVATE: u32 = 1 << 1;
    /// Compiler generated
    pub const SYNTHETIC: u32 = 1 << 2;
    /// Synthetic host of a closure
    pub const CLOSURE_HOST: u32 = 1 << 3;
    /// Engine generated executor unit
    pub const EXECUTOR: u32 = 1 << 4;
    /// Engine generated dispatcher unit
    pub const REWRITTEN: u32 = 1 << 5;
}

/// Field flags
pub mod field_flags {
    /// Static field (reserved; statics are not part of an instance layout)
    pub const STATIC: u32 = 1 << 0;
    /// Captured variable of a closure host
    pub const CAPTURED: u32 = 1 << 1;
    /// Enclosing-instance reference of a closure host
    pub const ENCLOSING: u32 = 1 << 2;
}

/// Method flags
pub mod method_flags {
    /// No receiver
    pub const STATIC: u32 = 1 << 0;
    /// Public method
    pub const PUBLIC: u32 = 1 << 1;
    /// Private method
    pub const PRIVATE: u32 = 1 << 2;
    /// Compiler generated
    pub const SYNTHETIC: u32 = 1 << 3;
}

/// Field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type
    pub descriptor: TypeDesc,
    /// `field_flags` bits
    pub flags: u32,
}

impl FieldDef {
    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.flags & field_flags::STATIC != 0
    }

    /// Whether the field holds a captured variable
    pub fn is_captured(&self) -> bool {
        self.flags & field_flags::CAPTURED != 0
    }

    /// Whether the field holds the enclosing instance
    pub fn is_enclosing(&self) -> bool {
        self.flags & field_flags::ENCLOSING != 0
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        writer.emit_string(&self.descriptor.to_string());
        writer.emit_u32(self.flags);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, UnitError> {
        let name = reader.read_string()?;
        let descriptor = TypeDesc::parse(&reader.read_string()?)?;
        let flags = reader.read_u32()?;
        Ok(Self {
            name,
            descriptor,
            flags,
        })
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Name and descriptor
    pub signature: MethodSignature,
    /// `method_flags` bits
    pub flags: u32,
    /// Declared exception type names
    pub exceptions: Vec<String>,
    /// Number of local slots, parameters (and receiver) included
    pub local_count: u16,
    /// Bytecode instructions
    pub code: Vec<u8>,
}

impl MethodDef {
    /// Whether the method has no receiver
    pub fn is_static(&self) -> bool {
        self.flags & method_flags::STATIC != 0
    }

    /// Signature key (`name(params)ret`)
    pub fn key(&self) -> String {
        self.signature.key()
    }

    /// Number of argument slots, receiver included
    pub fn arg_slots(&self) -> usize {
        self.signature.param_count() + usize::from(!self.is_static())
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.signature.name);
        writer.emit_string(&self.signature.descriptor.to_string());
        writer.emit_u32(self.flags);
        writer.emit_u32(self.exceptions.len() as u32);
        for exception in &self.exceptions {
            writer.emit_string(exception);
        }
        writer.emit_u16(self.local_count);
        writer.emit_blob(&self.code);
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, UnitError> {
        let name = reader.read_string()?;
        let descriptor = reader.read_string()?;
        let signature = MethodSignature::new(name, &descriptor)?;
        let flags = reader.read_u32()?;
        let exception_count = reader.read_u32()? as usize;
        let mut exceptions = Vec::with_capacity(exception_count.min(reader.remaining()));
        for _ in 0..exception_count {
            exceptions.push(reader.read_string()?);
        }
        let local_count = reader.read_u16()?;
        let code = reader.read_blob()?;
        Ok(Self {
            signature,
            flags,
            exceptions,
            local_count,
            code,
        })
    }
}

/// Free-form named attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Opaque payload
    pub data: Vec<u8>,
}

/// One version of one type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeUnit {
    /// Header flags (reserved)
    pub format_flags: u32,
    /// Fully qualified, dotted name
    pub name: String,
    /// Supertype name
    pub super_name: Option<String>,
    /// `access` bits
    pub access: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
    /// Attributes
    pub attributes: Vec<Attribute>,
}

impl TypeUnit {
    /// Create an empty public unit
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            format_flags: 0,
            name: name.into(),
            super_name: None,
            access: access::PUBLIC,
            constants: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Slashed form of the name (`basic/FirstClass`)
    pub fn internal_name(&self) -> String {
        internal_name(&self.name)
    }

    /// Whether the unit is public
    pub fn is_public(&self) -> bool {
        self.access & access::PUBLIC != 0
    }

    /// Whether the unit is private to its enclosing type
    pub fn is_private(&self) -> bool {
        self.access & access::PRIVATE != 0
    }

    /// Whether the unit hosts a closure
    pub fn is_closure_host(&self) -> bool {
        self.access & access::CLOSURE_HOST != 0
    }

    /// Find a method by signature key
    pub fn find_method(&self, key: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.key() == key)
    }

    /// Find a field by name
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Non-static fields in declaration order
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    /// Captured-variable fields of a closure host, in declaration order
    pub fn captured_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_captured())
    }

    /// Enclosing-instance field of a closure host
    pub fn enclosing_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_enclosing())
    }

    /// Find an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Summarize the unit; `raw` are the bytes it was decoded from
    pub fn descriptor(&self, raw: &[u8]) -> TypeDescriptor {
        TypeDescriptor {
            name: self.name.clone(),
            internal_name: self.internal_name(),
            super_name: self.super_name.clone(),
            access: self.access,
            fields: self
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.descriptor.clone()))
                .collect(),
            methods: self
                .methods
                .iter()
                .map(|m| MethodSummary {
                    key: m.key(),
                    is_static: m.is_static(),
                })
                .collect(),
            digest: Sha256::digest(raw).into(),
        }
    }

    /// Encode the unit to its binary form
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();

        writer.buffer.extend_from_slice(&MAGIC);
        writer.emit_u32(VERSION);
        writer.emit_u32(self.format_flags);
        let checksum_offset = writer.offset();
        writer.emit_u32(0); // Placeholder for checksum

        writer.emit_string(&self.name);
        match &self.super_name {
            Some(super_name) => {
                writer.emit_u8(1);
                writer.emit_string(super_name);
            }
            None => writer.emit_u8(0),
        }
        writer.emit_u32(self.access);

        self.constants.encode(&mut writer);

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            field.encode(&mut writer);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(&mut writer);
        }

        writer.emit_u32(self.attributes.len() as u32);
        for attribute in &self.attributes {
            writer.emit_string(&attribute.name);
            writer.emit_blob(&attribute.data);
        }

        let checksum = crc32fast::hash(&writer.buffer[HEADER_LEN..]);
        writer.patch_u32(checksum_offset, checksum);

        writer.into_bytes()
    }

    /// Decode a unit from its binary form
    pub fn decode(data: &[u8]) -> Result<Self, UnitError> {
        let mut reader = BytecodeReader::new(data);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(UnitError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(UnitError::UnsupportedVersion(version));
        }

        let format_flags = reader.read_u32()?;
        let stored_checksum = reader.read_u32()?;
        let calculated_checksum = crc32fast::hash(&data[HEADER_LEN..]);
        if stored_checksum != calculated_checksum {
            return Err(UnitError::ChecksumMismatch {
                expected: stored_checksum,
                actual: calculated_checksum,
            });
        }

        let name = reader.read_string()?;
        if name.is_empty() {
            return Err(UnitError::EmptyName);
        }
        let super_name = match reader.read_u8()? {
            0 => None,
            _ => Some(reader.read_string()?),
        };
        let access = reader.read_u32()?;

        let constants = ConstantPool::decode(&mut reader)?;

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::with_capacity(field_count.min(reader.remaining()));
        for _ in 0..field_count {
            fields.push(FieldDef::decode(&mut reader)?);
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::with_capacity(method_count.min(reader.remaining()));
        for _ in 0..method_count {
            methods.push(MethodDef::decode(&mut reader)?);
        }

        let attribute_count = reader.read_u32()? as usize;
        let mut attributes = Vec::with_capacity(attribute_count.min(reader.remaining()));
        for _ in 0..attribute_count {
            let name = reader.read_string()?;
            let data = reader.read_blob()?;
            attributes.push(Attribute { name, data });
        }

        if reader.has_more() {
            return Err(UnitError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            format_flags,
            name,
            super_name,
            access,
            constants,
            fields,
            methods,
            attributes,
        })
    }
}

/// Method entry of a [`TypeDescriptor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    /// Signature key
    pub key: String,
    /// Whether the method is static
    pub is_static: bool,
}

/// Signature metadata of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Dotted name
    pub name: String,
    /// Slashed name
    pub internal_name: String,
    /// Supertype name
    pub super_name: Option<String>,
    /// `access` bits
    pub access: u32,
    /// Field names and types in declaration order
    pub fields: Vec<(String, TypeDesc)>,
    /// Methods in declaration order
    pub methods: Vec<MethodSummary>,
    /// SHA-256 of the raw unit bytes
    pub digest: [u8; 32],
}

impl TypeDescriptor {
    /// Hex form of the content digest
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Whether a method with this key is declared
    pub fn has_method(&self, key: &str) -> bool {
        self.methods.iter().any(|m| m.key == key)
    }

    /// Declared type of a field
    pub fn field_type(&self, name: &str) -> Option<&TypeDesc> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// Slashed form of a dotted type name
pub fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Package of a dotted type name (empty for the default package)
pub fn package_of(name: &str) -> &str {
    name.rfind('.').map(|i| &name[..i]).unwrap_or("")
}

/// Name of the directly enclosing type of a nested type (`a.B$C` -> `a.B`)
pub fn enclosing_type_of(name: &str) -> Option<&str> {
    let simple_start = name.rfind('.').map(|i| i + 1).unwrap_or(0);
    name[simple_start..]
        .rfind('$')
        .filter(|&i| i > 0)
        .map(|i| &name[..simple_start + i])
        .filter(|outer| !outer.is_empty() && !outer.ends_with('$'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn sample_unit() -> TypeUnit {
        let mut unit = TypeUnit::new("basic.FirstClass");
        unit.super_name = Some("lang.Object".to_string());
        unit.fields.push(FieldDef {
            name: "count".to_string(),
            descriptor: TypeDesc::I32,
            flags: 0,
        });

        let mut writer = BytecodeWriter::new();
        writer.emit_const_i32(8);
        writer.emit_return();
        unit.methods.push(MethodDef {
            signature: MethodSignature::parse_key("run()I").unwrap(),
            flags: method_flags::STATIC | method_flags::PUBLIC,
            exceptions: vec!["lang.Failure".to_string()],
            local_count: 0,
            code: writer.into_bytes(),
        });
        unit.attributes.push(Attribute {
            name: "SourceFile".to_string(),
            data: b"FirstClass.src".to_vec(),
        });
        unit
    }

    #[test]
    fn test_unit_encoding() {
        let unit = sample_unit();
        let bytes = unit.encode();
        assert_eq!(&bytes[..4], b"HSWP");

        let decoded = TypeUnit::decode(&bytes).unwrap();
        assert_eq!(decoded, unit);
        assert_eq!(decoded.methods[0].code[0], Opcode::ConstI32.to_u8());
    }

    #[test]
    fn test_checksum_validation() {
        let mut bytes = sample_unit().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(
            TypeUnit::decode(&bytes),
            Err(UnitError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_magic_number() {
        let mut bytes = sample_unit().encode();
        bytes[0] = b'X';
        assert!(matches!(TypeUnit::decode(&bytes), Err(UnitError::InvalidMagic(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"HSWP");
        bytes.extend_from_slice(&999u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        assert!(matches!(
            TypeUnit::decode(&bytes),
            Err(UnitError::UnsupportedVersion(999))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = sample_unit().encode();
        assert!(TypeUnit::decode(&bytes[..10]).is_err());
    }

    #[test]
    fn test_descriptor_summary() {
        let unit = sample_unit();
        let bytes = unit.encode();
        let descriptor = unit.descriptor(&bytes);

        assert_eq!(descriptor.internal_name, "basic/FirstClass");
        assert!(descriptor.has_method("run()I"));
        assert_eq!(descriptor.field_type("count"), Some(&TypeDesc::I32));
        assert_eq!(descriptor.digest_hex().len(), 64);
        assert_eq!(descriptor.digest, unit.descriptor(&bytes).digest);
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(internal_name("a.b.C$D"), "a/b/C$D");
        assert_eq!(package_of("a.b.C$D"), "a.b");
        assert_eq!(package_of("Top"), "");
        assert_eq!(enclosing_type_of("a.b.C$D"), Some("a.b.C"));
        assert_eq!(enclosing_type_of("a.b.C$D$E"), Some("a.b.C$D"));
        assert_eq!(enclosing_type_of("a.b.C"), None);
        assert_eq!(enclosing_type_of("a.b.$Weird"), None);
    }
}
