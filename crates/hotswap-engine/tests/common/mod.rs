//! Shared unit builders for the integration tests

#![allow(dead_code)]

use hotswap_engine::{RegistryConfig, TypeRegistry};
use hotswap_unit::{
    access, field_flags, method_flags, MethodSignature, Opcode, TypeDesc, TypeUnit, UnitBuilder,
};
use std::sync::Arc;

pub const OUTER: &str = "basic.Outer";
pub const HOST: &str = "basic.Outer$Lambda0";
pub const RENAMED_HOST: &str = "basic.Outer$Lambda1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn registry() -> Arc<TypeRegistry> {
    init_tracing();
    TypeRegistry::new(RegistryConfig::default())
}

pub fn registry_without_promotion() -> Arc<TypeRegistry> {
    init_tracing();
    TypeRegistry::new(RegistryConfig {
        promote_nested_visibility: false,
        ..RegistryConfig::default()
    })
}

/// `name` with a static `run()I` returning `value`
pub fn answer(name: &str, value: i32) -> Vec<u8> {
    UnitBuilder::new(name)
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(value).ret();
        })
        .encode()
        .unwrap()
}

/// Closure host capturing one `I` and returning `n * 11 + offset`
pub fn closure_host(name: &str, offset: i32) -> Vec<u8> {
    UnitBuilder::new(name)
        .access(access::PRIVATE | access::SYNTHETIC | access::CLOSURE_HOST)
        .field("n", "I", field_flags::CAPTURED)
        .method("apply()I", 0, 1, |b| {
            b.load(0)
                .get_field(name, "n")
                .const_i32(11)
                .op(Opcode::Imul);
            if offset != 0 {
                b.const_i32(offset).op(Opcode::Iadd);
            }
            b.ret();
        })
        .encode()
        .unwrap()
}

/// Outer type whose `run()I` builds a closure over 7 and calls it,
/// and whose `make(I)` hands the closure out
pub fn outer(host: &str) -> Vec<u8> {
    UnitBuilder::new(OUTER)
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(7)
                .make_closure(host, 1, 0)
                .invoke_closure("apply()I")
                .ret();
        })
        .method("make(I)Llang.Function;", method_flags::STATIC, 1, |b| {
            b.load(0).make_closure(host, 1, 0).ret();
        })
        .encode()
        .unwrap()
}

/// `basic.Point` with field `x`, plus `y` and its accessors from version 2 on
pub fn point(version: u32) -> Vec<u8> {
    let owner = "basic.Point";
    let mut builder = UnitBuilder::new(owner)
        .field("x", "I", 0)
        .method("getX()I", 0, 1, |b| {
            b.load(0).get_field(owner, "x").ret();
        })
        .method("setX(I)V", 0, 2, |b| {
            b.load(0).load(1).put_field(owner, "x").ret_void();
        });

    if version >= 2 {
        builder = builder
            .field("y", "I", 0)
            .method("getY()I", 0, 1, |b| {
                b.load(0).get_field(owner, "y").ret();
            })
            .method("setY(I)V", 0, 2, |b| {
                b.load(0).load(1).put_field(owner, "y").ret_void();
            })
            .method("sum()I", 0, 1, |b| {
                b.load(0)
                    .get_field(owner, "x")
                    .load(0)
                    .get_field(owner, "y")
                    .op(Opcode::Iadd)
                    .ret();
            });
    }
    builder.encode().unwrap()
}

/// Rename a type everywhere it is mentioned in a unit
///
/// Touches the unit name, nested type names, constant pool entries and
/// every object descriptor; method bodies are left byte for byte.
pub fn rename_type(bytes: &[u8], from: &str, to: &str) -> Vec<u8> {
    let rename = |name: &str| -> Option<String> {
        if name == from {
            return Some(to.to_string());
        }
        name.strip_prefix(from)
            .filter(|rest| rest.starts_with('$'))
            .map(|rest| format!("{}{}", to, rest))
    };
    let rename_desc = |desc: &mut TypeDesc| {
        if let TypeDesc::Object(name) = desc {
            if let Some(renamed) = rename(name.as_str()) {
                *name = renamed;
            }
        }
    };
    let rename_signature = |signature: &mut MethodSignature| {
        signature.descriptor.params.iter_mut().for_each(&rename_desc);
        rename_desc(&mut signature.descriptor.ret);
    };

    let mut unit = TypeUnit::decode(bytes).unwrap();
    if let Some(renamed) = rename(unit.name.as_str()) {
        unit.name = renamed;
    }
    if let Some(super_name) = unit.super_name.as_mut() {
        if let Some(renamed) = rename(super_name.as_str()) {
            *super_name = renamed;
        }
    }
    for constant in &mut unit.constants.strings {
        if let Some(renamed) = rename(constant.as_str()) {
            *constant = renamed;
        } else if let Ok(mut signature) = MethodSignature::parse_key(constant) {
            rename_signature(&mut signature);
            *constant = signature.key();
        }
    }
    for field in &mut unit.fields {
        rename_desc(&mut field.descriptor);
    }
    for method in &mut unit.methods {
        rename_signature(&mut method.signature);
    }
    unit.encode()
}
