//! Programmatic construction of type units
//!
//! `UnitBuilder` is what a compiler front end (or a test) uses to produce
//! unit bytes. Method bodies are written through a [`BodyBuilder`], which
//! interns names and signature keys into the unit's constant pool.

use crate::constants::ConstantPool;
use crate::descriptor::{DescriptorError, MethodSignature, TypeDesc};
use crate::encoder::BytecodeWriter;
use crate::opcode::Opcode;
use crate::unit::{access, Attribute, FieldDef, MethodDef, TypeUnit};

struct PendingMethod {
    key: String,
    flags: u32,
    exceptions: Vec<String>,
    local_count: u16,
    code: Vec<u8>,
}

/// Builder for a [`TypeUnit`]
pub struct UnitBuilder {
    name: String,
    super_name: Option<String>,
    access: u32,
    constants: ConstantPool,
    fields: Vec<(String, String, u32)>,
    methods: Vec<PendingMethod>,
    attributes: Vec<Attribute>,
}

impl UnitBuilder {
    /// Start a public unit
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: None,
            access: access::PUBLIC,
            constants: ConstantPool::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Set the supertype
    pub fn extends(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    /// Replace the access flags
    pub fn access(mut self, flags: u32) -> Self {
        self.access = flags;
        self
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, descriptor: &str, flags: u32) -> Self {
        self.fields.push((name.into(), descriptor.to_string(), flags));
        self
    }

    /// Attach an attribute
    pub fn attribute(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            data,
        });
        self
    }

    /// Declare a method; `key` is a signature key such as `run()I`
    pub fn method(
        self,
        key: &str,
        flags: u32,
        local_count: u16,
        body: impl FnOnce(&mut BodyBuilder<'_>),
    ) -> Self {
        self.method_throwing(key, flags, local_count, &[], body)
    }

    /// Declare a method with a `throws` list
    pub fn method_throwing(
        mut self,
        key: &str,
        flags: u32,
        local_count: u16,
        exceptions: &[&str],
        body: impl FnOnce(&mut BodyBuilder<'_>),
    ) -> Self {
        let mut builder = BodyBuilder {
            writer: BytecodeWriter::new(),
            constants: &mut self.constants,
        };
        body(&mut builder);
        let code = builder.writer.into_bytes();
        self.methods.push(PendingMethod {
            key: key.to_string(),
            flags,
            exceptions: exceptions.iter().map(|e| e.to_string()).collect(),
            local_count,
            code,
        });
        self
    }

    /// Finish the unit
    pub fn build(self) -> Result<TypeUnit, DescriptorError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, descriptor, flags) in self.fields {
            fields.push(FieldDef {
                name,
                descriptor: TypeDesc::parse(&descriptor)?,
                flags,
            });
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        for pending in self.methods {
            methods.push(MethodDef {
                signature: MethodSignature::parse_key(&pending.key)?,
                flags: pending.flags,
                exceptions: pending.exceptions,
                local_count: pending.local_count,
                code: pending.code,
            });
        }

        Ok(TypeUnit {
            format_flags: 0,
            name: self.name,
            super_name: self.super_name,
            access: self.access,
            constants: self.constants,
            fields,
            methods,
            attributes: self.attributes,
        })
    }

    /// Finish and encode the unit
    pub fn encode(self) -> Result<Vec<u8>, DescriptorError> {
        Ok(self.build()?.encode())
    }
}

/// Writer for one method body, interning names into the unit's pool
pub struct BodyBuilder<'a> {
    writer: BytecodeWriter,
    constants: &'a mut ConstantPool,
}

impl BodyBuilder<'_> {
    /// Raw access to the underlying writer
    pub fn writer(&mut self) -> &mut BytecodeWriter {
        &mut self.writer
    }

    /// Intern a string constant
    pub fn intern(&mut self, value: &str) -> u32 {
        self.constants.intern_string(value)
    }

    /// Emit an opcode without operands
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.writer.emit_opcode(opcode);
        self
    }

    /// Push an i32
    pub fn const_i32(&mut self, value: i32) -> &mut Self {
        self.writer.emit_const_i32(value);
        self
    }

    /// Push an i64
    pub fn const_i64(&mut self, value: i64) -> &mut Self {
        self.writer.emit_const_i64(value);
        self
    }

    /// Push an f64
    pub fn const_f64(&mut self, value: f64) -> &mut Self {
        self.writer.emit_const_f64(value);
        self
    }

    /// Push a string literal
    pub fn const_str(&mut self, value: &str) -> &mut Self {
        let index = self.intern(value);
        self.writer.emit_const_str(index);
        self
    }

    /// Load a local slot
    pub fn load(&mut self, index: u16) -> &mut Self {
        self.writer.emit_load_local(index);
        self
    }

    /// Store into a local slot
    pub fn store(&mut self, index: u16) -> &mut Self {
        self.writer.emit_store_local(index);
        self
    }

    /// Emit a forward jump; bind it with [`BodyBuilder::bind`]
    pub fn jump(&mut self, opcode: Opcode) -> usize {
        self.writer.emit_jump(opcode)
    }

    /// Bind a forward jump to the current offset
    pub fn bind(&mut self, patch: usize) -> &mut Self {
        self.writer.bind_jump(patch);
        self
    }

    /// Return the top of stack
    pub fn ret(&mut self) -> &mut Self {
        self.writer.emit_return();
        self
    }

    /// Return without a value
    pub fn ret_void(&mut self) -> &mut Self {
        self.writer.emit_return_void();
        self
    }

    /// Call a static method
    pub fn invoke_static(&mut self, owner: &str, key: &str) -> &mut Self {
        let owner = self.intern(owner);
        let key = self.intern(key);
        self.writer.emit_invoke_static(owner, key);
        self
    }

    /// Call an instance method
    pub fn invoke_virtual(&mut self, owner: &str, key: &str) -> &mut Self {
        let owner = self.intern(owner);
        let key = self.intern(key);
        self.writer.emit_invoke_virtual(owner, key);
        self
    }

    /// Call a closure's functional method
    pub fn invoke_closure(&mut self, key: &str) -> &mut Self {
        let key = self.intern(key);
        self.writer.emit_invoke_closure(key);
        self
    }

    /// Allocate an instance
    pub fn new_object(&mut self, owner: &str) -> &mut Self {
        let owner = self.intern(owner);
        self.writer.emit_new(owner);
        self
    }

    /// Read a field
    pub fn get_field(&mut self, owner: &str, name: &str) -> &mut Self {
        let owner = self.intern(owner);
        let name = self.intern(name);
        self.writer.emit_get_field(owner, name);
        self
    }

    /// Write a field
    pub fn put_field(&mut self, owner: &str, name: &str) -> &mut Self {
        let owner = self.intern(owner);
        let name = self.intern(name);
        self.writer.emit_put_field(owner, name);
        self
    }

    /// Create a closure hosted by `host`
    pub fn make_closure(&mut self, host: &str, capture_count: u8, flags: u8) -> &mut Self {
        let host = self.intern(host);
        self.writer.emit_make_closure(host, capture_count, flags);
        self
    }
}
