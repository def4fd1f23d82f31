//! Dispatcher unit construction
//!
//! The loaded unit keeps the initial version's name, supertype, flags and
//! declared members, so existing callers bind to it unchanged. Each method
//! body only forwards its arguments:
//!
//! ```text
//! LOAD_LOCAL 0 .. LOAD_LOCAL argc-1
//! DISPATCH   "name(desc)ret", argc
//! RETURN | RETURN_VOID
//! ```

use crate::error::RejectReason;
use hotswap_unit::{access, BytecodeWriter, ConstantPool, MethodDef, TypeUnit};

/// Build the dispatcher unit for an initial version
pub fn build_dispatcher(unit: &TypeUnit) -> Result<TypeUnit, RejectReason> {
    let mut constants = ConstantPool::new();
    let mut methods = Vec::with_capacity(unit.methods.len());

    for method in &unit.methods {
        let key = method.key();
        let argc = u16::try_from(method.arg_slots()).map_err(|_| {
            RejectReason::MalformedUnit(format!("{} has too many parameters", key))
        })?;
        let sig = constants.intern_string(&key);

        let mut writer = BytecodeWriter::with_capacity(usize::from(argc) * 3 + 8);
        for local in 0..argc {
            writer.emit_load_local(local);
        }
        writer.emit_dispatch(sig, argc);
        if method.signature.returns_value() {
            writer.emit_return();
        } else {
            writer.emit_return_void();
        }

        methods.push(MethodDef {
            signature: method.signature.clone(),
            flags: method.flags,
            exceptions: method.exceptions.clone(),
            local_count: argc,
            code: writer.into_bytes(),
        });
    }

    Ok(TypeUnit {
        format_flags: unit.format_flags,
        name: unit.name.clone(),
        super_name: unit.super_name.clone(),
        access: unit.access | access::REWRITTEN,
        constants,
        fields: unit.fields.clone(),
        methods,
        attributes: unit.attributes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_unit::{decode_instructions, method_flags, verify_unit, Opcode, Operands, UnitBuilder, VerifyMode};

    #[test]
    fn test_dispatcher_forwards_arguments() {
        let unit = UnitBuilder::new("basic.Calc")
            .field("base", "I", 0)
            .method_throwing("add(II)I", 0, 4, &["lang.Overflow"], |b| {
                b.load(1).load(2).op(Opcode::Iadd).store(3).load(3).ret();
            })
            .method("reset()V", method_flags::STATIC, 0, |b| {
                b.ret_void();
            })
            .build()
            .unwrap();

        let dispatcher = build_dispatcher(&unit).unwrap();
        assert_eq!(dispatcher.name, "basic.Calc");
        assert_ne!(dispatcher.access & access::REWRITTEN, 0);
        assert_eq!(dispatcher.fields, unit.fields);
        assert_eq!(dispatcher.methods[0].exceptions, vec!["lang.Overflow".to_string()]);
        assert_eq!(dispatcher.methods[0].local_count, 3);

        let body = decode_instructions(&dispatcher.methods[0].code).unwrap();
        let ops: Vec<Opcode> = body.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::LoadLocal,
                Opcode::LoadLocal,
                Opcode::LoadLocal,
                Opcode::Dispatch,
                Opcode::Return
            ]
        );
        assert_eq!(body[3].operands, Operands::Dispatch { sig: 0, argc: 3 });
        assert_eq!(dispatcher.constants.get_string(0), Some("add(II)I"));

        let reset = decode_instructions(&dispatcher.methods[1].code).unwrap();
        assert_eq!(reset.len(), 2);
        assert_eq!(reset[1].opcode, Opcode::ReturnVoid);

        assert_eq!(verify_unit(&dispatcher, VerifyMode::Rewritten), Ok(()));
    }
}
