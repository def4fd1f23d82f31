//! Integration tests for the type unit format and verifier

use hotswap_unit::{
    access, closure_flags, enclosing_type_of, field_flags, method_flags, package_of, verify_unit,
    Opcode, TypeDesc, TypeUnit, UnitBuilder, UnitError, VerifyError, VerifyMode,
};

fn closure_host() -> UnitBuilder {
    UnitBuilder::new("basic.LambdaA$Lambda0")
        .access(access::PRIVATE | access::SYNTHETIC | access::CLOSURE_HOST)
        .field("this$0", "Lbasic.LambdaA;", field_flags::ENCLOSING)
        .field("cap$0", "I", field_flags::CAPTURED)
        .method("apply()I", 0, 1, |b| {
            b.load(0)
                .get_field("basic.LambdaA$Lambda0", "cap$0")
                .const_i32(7)
                .op(Opcode::Imul)
                .ret();
        })
}

#[test]
fn test_closure_host_roundtrip() {
    let bytes = closure_host().encode().unwrap();
    let unit = TypeUnit::decode(&bytes).expect("Failed to decode");

    assert!(unit.is_closure_host());
    assert!(unit.is_private());
    assert!(!unit.is_public());
    assert_eq!(unit.captured_fields().count(), 1);
    assert_eq!(unit.enclosing_field().map(|f| f.name.as_str()), Some("this$0"));
    assert_eq!(
        unit.enclosing_field().map(|f| &f.descriptor),
        Some(&TypeDesc::Object("basic.LambdaA".to_string()))
    );
    assert_eq!(verify_unit(&unit, VerifyMode::Source), Ok(()));
}

#[test]
fn test_identical_units_share_a_digest() {
    let a = closure_host().encode().unwrap();
    let b = closure_host().encode().unwrap();
    assert_eq!(a, b);

    let unit = TypeUnit::decode(&a).unwrap();
    assert_eq!(unit.descriptor(&a).digest, unit.descriptor(&b).digest);

    let renamed = UnitBuilder::new("basic.LambdaA$Lambda1").encode().unwrap();
    let other = TypeUnit::decode(&renamed).unwrap();
    assert_ne!(unit.descriptor(&a).digest, other.descriptor(&renamed).digest);
}

#[test]
fn test_closure_creation_verifies() {
    let unit = UnitBuilder::new("basic.LambdaA")
        .method("run()I", 0, 2, |b| {
            b.const_i32(11)
                .store(1)
                .load(0)
                .load(1)
                .make_closure("basic.LambdaA$Lambda0", 1, closure_flags::CAPTURES_THIS)
                .invoke_closure("apply()I")
                .ret();
        })
        .build()
        .unwrap();
    assert_eq!(verify_unit(&unit, VerifyMode::Source), Ok(()));
}

#[test]
fn test_loop_with_backward_jump_verifies() {
    // sum = 0; i = 0; while i < 4 { sum += i; i += 1 } return sum
    let unit = UnitBuilder::new("basic.Loop")
        .method("sum()I", method_flags::STATIC, 2, |b| {
            b.const_i32(0).store(0).const_i32(0).store(1);
            let head = b.writer().offset();
            b.load(1).const_i32(4).op(Opcode::Ilt);
            let exit = b.jump(Opcode::JmpIfFalse);
            b.load(0).load(1).op(Opcode::Iadd).store(0);
            b.load(1).const_i32(1).op(Opcode::Iadd).store(1);
            b.writer().emit_opcode(Opcode::Jmp);
            let back = head as i32 - (b.writer().offset() as i32 + 4);
            b.writer().emit_i32(back);
            b.bind(exit);
            b.load(0).ret();
        })
        .build()
        .unwrap();
    assert_eq!(verify_unit(&unit, VerifyMode::Source), Ok(()));
}

#[test]
fn test_duplicate_members_rejected() {
    let unit = UnitBuilder::new("basic.Dup")
        .field("x", "I", 0)
        .field("x", "J", 0)
        .build()
        .unwrap();
    assert_eq!(
        verify_unit(&unit, VerifyMode::Source),
        Err(VerifyError::DuplicateField("x".to_string()))
    );

    let unit = UnitBuilder::new("basic.Dup")
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(1).ret();
        })
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(2).ret();
        })
        .build()
        .unwrap();
    assert_eq!(
        verify_unit(&unit, VerifyMode::Source),
        Err(VerifyError::DuplicateMethod("run()I".to_string()))
    );
}

#[test]
fn test_garbage_is_rejected() {
    assert!(TypeUnit::decode(b"").is_err());
    assert!(matches!(
        TypeUnit::decode(b"NOPE\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00"),
        Err(UnitError::InvalidMagic(_))
    ));
}

#[test]
fn test_unknown_opcode_in_body() {
    let mut unit = UnitBuilder::new("basic.Bad")
        .method("run()V", method_flags::STATIC, 0, |b| {
            b.ret_void();
        })
        .build()
        .unwrap();
    unit.methods[0].code.insert(0, 0xFF);

    let bytes = unit.encode();
    let decoded = TypeUnit::decode(&bytes).unwrap();
    assert!(matches!(
        verify_unit(&decoded, VerifyMode::Source),
        Err(VerifyError::Decode { .. })
    ));
}

#[test]
fn test_nested_type_names() {
    let host = closure_host().build().unwrap();
    assert_eq!(enclosing_type_of(&host.name), Some("basic.LambdaA"));
    assert_eq!(package_of(&host.name), "basic");

    assert_eq!(enclosing_type_of("basic.A$B$C"), Some("basic.A$B"));
    assert_eq!(enclosing_type_of("basic.A"), None);
    assert_eq!(package_of("Top"), "");
    assert_eq!(enclosing_type_of("Top"), None);
}
