//! Method body rewriting
//!
//! Instructions are patched in place; every replacement has the encoded
//! length of the instruction it replaces.

use super::{RewriteContext, RewriteStats};
use crate::capture::{HostShape, SiteBinding, SiteId};
use crate::error::RejectReason;
use crate::reloadable::ReloadableType;
use hotswap_unit::{
    closure_flags, decode_instructions, patch_instruction, ConstantPool, Instruction, MethodDef,
    Opcode, Operands, TypeUnit,
};
use std::sync::Arc;
use tracing::debug;

/// Owner of a referenced member
enum Target {
    /// The type being rewritten
    Own,
    /// Another registered type
    Registered(Arc<ReloadableType>),
    /// An enclosing type that is not registered yet
    LateBound,
}

pub(super) struct BodyRewriter<'a, 'c> {
    pub unit: &'a TypeUnit,
    pub ctx: &'a RewriteContext<'c>,
    pub constants: &'a mut ConstantPool,
    pub bindings: &'a mut Vec<SiteBinding>,
    pub stats: &'a mut RewriteStats,
}

impl BodyRewriter<'_, '_> {
    fn malformed(&self, method: &MethodDef, detail: impl std::fmt::Display) -> RejectReason {
        RejectReason::MalformedUnit(format!("{}.{}: {}", self.unit.name, method.key(), detail))
    }

    fn string_at(&self, method: &MethodDef, index: u32) -> Result<String, RejectReason> {
        self.constants
            .get_string(index)
            .map(str::to_string)
            .ok_or_else(|| self.malformed(method, format!("bad constant index {}", index)))
    }

    fn target(&self, name: &str) -> Result<Target, RejectReason> {
        if name == self.unit.name {
            return Ok(Target::Own);
        }
        if let Some(ty) = self.ctx.registry.get(name) {
            return Ok(Target::Registered(ty));
        }
        let encloses = self
            .unit
            .name
            .strip_prefix(name)
            .map_or(false, |rest| rest.starts_with('$'));
        if encloses {
            debug!(from = %self.unit.name, target = name, "late-bound reference to enclosing type");
            return Ok(Target::LateBound);
        }
        Err(RejectReason::UnresolvedSibling {
            from: self.unit.name.clone(),
            missing: name.to_string(),
        })
    }

    /// Rewrite one method body
    pub fn rewrite(&mut self, method: &MethodDef) -> Result<Vec<u8>, RejectReason> {
        let mut code = method.code.clone();
        let instructions = decode_instructions(&code).map_err(|e| self.malformed(method, e))?;
        let mut closure_ordinal = 0u32;

        for instruction in &instructions {
            if instruction.opcode.is_engine_only() {
                return Err(self.malformed(
                    method,
                    format!("engine opcode {} in supplied code", instruction.opcode.name()),
                ));
            }

            let replacement = match (instruction.opcode, instruction.operands) {
                (Opcode::GetField, Operands::Pair(owner, name)) => {
                    Some(self.field_access(method, instruction, owner, name, false)?)
                }
                (Opcode::PutField, Operands::Pair(owner, name)) => {
                    Some(self.field_access(method, instruction, owner, name, true)?)
                }
                (Opcode::InvokeStatic, Operands::Pair(owner, sig)) => {
                    self.invocation(method, instruction, owner, sig, true)?
                }
                (Opcode::InvokeVirtual, Operands::Pair(owner, sig)) => {
                    self.invocation(method, instruction, owner, sig, false)?
                }
                (Opcode::New, Operands::Index(owner)) => {
                    self.allocation(method, owner)?;
                    None
                }
                (
                    Opcode::MakeClosure,
                    Operands::Closure {
                        index,
                        count,
                        flags,
                    },
                ) => {
                    let rewritten =
                        self.closure_creation(method, instruction, closure_ordinal, index, count, flags)?;
                    closure_ordinal += 1;
                    Some(rewritten)
                }
                _ => None,
            };

            if let Some(replacement) = replacement {
                if !patch_instruction(&mut code, instruction, &replacement) {
                    return Err(self.malformed(method, "rewrite changed instruction size"));
                }
            }
        }

        Ok(code)
    }

    fn field_access(
        &mut self,
        method: &MethodDef,
        instruction: &Instruction,
        owner_index: u32,
        name_index: u32,
        write: bool,
    ) -> Result<Instruction, RejectReason> {
        let owner = self.string_at(method, owner_index)?;
        let name = self.string_at(method, name_index)?;

        let (slot_op, ext_op) = if write {
            (Opcode::PutFieldSlot, Opcode::PutExtField)
        } else {
            (Opcode::GetFieldSlot, Opcode::GetExtField)
        };
        let slot_access = |slot: usize| Instruction {
            opcode: slot_op,
            operands: Operands::Pair(owner_index, slot as u32),
            ..*instruction
        };
        let ext_access = Instruction {
            opcode: ext_op,
            operands: Operands::Pair(owner_index, name_index),
            ..*instruction
        };

        match self.target(&owner)? {
            Target::Own => {
                let field = self
                    .unit
                    .find_field(&name)
                    .ok_or_else(|| self.malformed(method, format!("undeclared field {}", name)))?;
                if field.is_static() {
                    return Err(self.malformed(method, format!("static field {} is not supported", name)));
                }
                if field.is_captured() || field.is_enclosing() {
                    if write {
                        return Err(self.malformed(method, format!("write to captured field {}", name)));
                    }
                    if field.is_enclosing() {
                        return Ok(Instruction {
                            opcode: Opcode::GetEnclosing,
                            operands: Operands::Pair(owner_index, name_index),
                            ..*instruction
                        });
                    }
                    let position = self
                        .unit
                        .captured_fields()
                        .position(|f| f.name == name)
                        .unwrap_or(0);
                    return Ok(Instruction {
                        opcode: Opcode::GetCaptured,
                        operands: Operands::Pair(owner_index, position as u32),
                        ..*instruction
                    });
                }
                match self.ctx.layout.slot_of(&name) {
                    Some(slot) => {
                        self.stats.slot_accesses += 1;
                        Ok(slot_access(slot))
                    }
                    None => {
                        debug!(owner = %owner, field = %name, "extension field access");
                        self.stats.extension_accesses += 1;
                        Ok(ext_access)
                    }
                }
            }
            Target::Registered(ty) => {
                if ty.is_closure_host() {
                    return Err(self.malformed(
                        method,
                        format!("{} state is only reachable from its own code", owner),
                    ));
                }
                if let Some(slot) = ty.layout().slot_of(&name) {
                    self.stats.slot_accesses += 1;
                    return Ok(slot_access(slot));
                }
                if ty.field_type(&name).is_none() {
                    return Err(self.malformed(method, format!("unknown field {}.{}", owner, name)));
                }
                debug!(owner = %owner, field = %name, "extension field access");
                self.stats.extension_accesses += 1;
                Ok(ext_access)
            }
            Target::LateBound => {
                self.stats.extension_accesses += 1;
                Ok(ext_access)
            }
        }
    }

    fn invocation(
        &mut self,
        method: &MethodDef,
        instruction: &Instruction,
        owner_index: u32,
        sig_index: u32,
        is_static: bool,
    ) -> Result<Option<Instruction>, RejectReason> {
        let owner = self.string_at(method, owner_index)?;
        let key = self.string_at(method, sig_index)?;

        let bound_kind = match self.target(&owner)? {
            Target::Own => {
                let declared = self
                    .unit
                    .find_method(&key)
                    .ok_or_else(|| self.malformed(method, format!("call to undeclared method {}", key)))?;
                if declared.is_static() != is_static {
                    return Err(self.malformed(method, format!("call kind mismatch for {}", key)));
                }
                self.ctx.loaded_methods.get(&key).copied()
            }
            Target::Registered(ty) => ty.loaded_method_kind(&key),
            Target::LateBound => None,
        };

        if bound_kind == Some(is_static) {
            return Ok(None);
        }

        debug!(owner = %owner, method = %key, "dynamic invocation");
        self.stats.dynamic_invokes += 1;
        let opcode = if is_static {
            Opcode::InvokeDynamicStatic
        } else {
            Opcode::InvokeDynamicVirtual
        };
        Ok(Some(Instruction {
            opcode,
            ..*instruction
        }))
    }

    fn allocation(&mut self, method: &MethodDef, owner_index: u32) -> Result<(), RejectReason> {
        let owner = self.string_at(method, owner_index)?;
        let host = match self.target(&owner)? {
            Target::Own => self.unit.is_closure_host(),
            Target::Registered(ty) => ty.is_closure_host(),
            Target::LateBound => false,
        };
        if host {
            return Err(self.malformed(
                method,
                format!("{} hosts a closure and cannot be allocated directly", owner),
            ));
        }
        Ok(())
    }

    fn closure_creation(
        &mut self,
        method: &MethodDef,
        instruction: &Instruction,
        ordinal: u32,
        host_index: u32,
        count: u8,
        flags: u8,
    ) -> Result<Instruction, RejectReason> {
        let host = self.string_at(method, host_index)?;

        let (host_id, host_version, shape) = match self.target(&host)? {
            Target::Own if self.unit.is_closure_host() => {
                (self.ctx.type_id, self.ctx.version, host_shape_of(self.unit))
            }
            Target::Registered(ty) => match ty.current_host_shape() {
                Some((version, shape)) => (ty.id(), version, shape),
                None => return Err(self.malformed(method, format!("{} is not a closure host", host))),
            },
            Target::Own => {
                return Err(self.malformed(method, format!("{} is not a closure host", host)));
            }
            Target::LateBound => {
                return Err(RejectReason::UnresolvedSibling {
                    from: self.unit.name.clone(),
                    missing: host,
                });
            }
        };

        if shape.captured.len() != usize::from(count) {
            return Err(self.malformed(
                method,
                format!(
                    "closure passes {} values but {} captures {}",
                    count,
                    host,
                    shape.captured.len()
                ),
            ));
        }
        let captures_this = flags & closure_flags::CAPTURES_THIS != 0;
        if captures_this != shape.captures_this {
            return Err(self.malformed(
                method,
                format!("enclosing-instance capture does not match {}", host),
            ));
        }

        let site = SiteId::new(self.ctx.type_id, method.key(), ordinal);
        let site_index = self.constants.intern_string(&site.key());
        debug!(site = %site, host = %host, "capture site");
        self.stats.capture_sites += 1;
        self.bindings.push(SiteBinding {
            id: site,
            host,
            host_id,
            host_version,
            passed: usize::from(count),
            shape,
        });

        Ok(Instruction {
            opcode: Opcode::MakeCaptured,
            operands: Operands::Closure {
                index: site_index,
                count,
                flags,
            },
            ..*instruction
        })
    }
}

/// Capture shape declared by a closure host unit
pub(crate) fn host_shape_of(unit: &TypeUnit) -> HostShape {
    HostShape {
        captured: unit
            .captured_fields()
            .map(|f| f.descriptor.clone())
            .collect(),
        captures_this: unit.enclosing_field().is_some(),
    }
}
