//! Integration tests for registering and reloading plain types
//!
//! Tests cover:
//! - Reloading identical and changed bodies
//! - Calls between reloadable types
//! - Removed members and rejected reloads
//! - Registration errors
//! - Scoped batch reloads

mod common;

use common::{answer, registry};
use hotswap_engine::{
    LookupError, RegistryError, RejectReason, Value, Vm, VmError, INITIAL_LABEL,
};
use hotswap_unit::{method_flags, Opcode, UnitBuilder};
use std::sync::Arc;

#[test]
fn test_identical_reload_keeps_result() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();
    let vm = Vm::new(Arc::clone(&registry));

    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(8));
    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(8));

    ty.reload("002", &answer("basic.FirstClass", 8)).unwrap();
    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(8));
    assert_eq!(ty.current_table().label(), "002");
    assert_eq!(ty.version_count(), 2);
}

#[test]
fn test_changed_body_is_picked_up_on_next_call() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();
    let vm = Vm::new(Arc::clone(&registry));

    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(8));
    ty.reload("002", &answer("basic.FirstClass", 9)).unwrap();
    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(9));

    // the loaded unit never changes
    assert_eq!(ty.loaded_unit().name, "basic.FirstClass");
    assert_eq!(ty.initial_version().label, INITIAL_LABEL);
}

#[test]
fn test_reload_through_registry_by_name() {
    let registry = registry();
    registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();
    registry
        .reload("basic.FirstClass", "002", &answer("basic.FirstClass", 3))
        .unwrap();

    let vm = Vm::new(Arc::clone(&registry));
    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(3));

    assert_eq!(
        registry.reload("basic.Nobody", "002", &answer("basic.Nobody", 1)),
        Err(RegistryError::UnknownType("basic.Nobody".to_string()))
    );
}

#[test]
fn test_callers_see_callee_reload() {
    let registry = registry();
    let callee = registry.register("basic.Callee", &answer("basic.Callee", 8)).unwrap();

    let caller = UnitBuilder::new("basic.Caller")
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.invoke_static("basic.Callee", "run()I")
                .const_i32(1)
                .op(Opcode::Iadd)
                .ret();
        })
        .encode()
        .unwrap();
    registry.register("basic.Caller", &caller).unwrap();

    let vm = Vm::new(Arc::clone(&registry));
    assert_eq!(vm.invoke_static("basic.Caller", "run()I", &[]).unwrap(), Value::I32(9));

    callee.reload("002", &answer("basic.Callee", 41)).unwrap();
    assert_eq!(vm.invoke_static("basic.Caller", "run()I", &[]).unwrap(), Value::I32(42));
}

#[test]
fn test_new_static_method_called_from_reloaded_body() {
    let registry = registry();
    let ty = registry.register("basic.Calc", &answer("basic.Calc", 1)).unwrap();

    let v2 = UnitBuilder::new("basic.Calc")
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(6).invoke_static("basic.Calc", "triple(I)I").ret();
        })
        .method("triple(I)I", method_flags::STATIC, 1, |b| {
            b.load(0).const_i32(3).op(Opcode::Imul).ret();
        })
        .encode()
        .unwrap();
    ty.reload("002", &v2).unwrap();

    let vm = Vm::new(Arc::clone(&registry));
    assert_eq!(vm.invoke_static("basic.Calc", "run()I", &[]).unwrap(), Value::I32(18));

    // not part of the loaded unit, so a host caller cannot reach it directly
    assert!(matches!(
        vm.invoke_static("basic.Calc", "triple(I)I", &[Value::I32(2)]),
        Err(VmError::Lookup(LookupError::NoSuchMember { .. }))
    ));
}

#[test]
fn test_removed_member_invoked() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();

    let v2 = UnitBuilder::new("basic.FirstClass")
        .method("other()I", method_flags::STATIC, 0, |b| {
            b.const_i32(0).ret();
        })
        .encode()
        .unwrap();
    ty.reload("002", &v2).unwrap();

    let vm = Vm::new(Arc::clone(&registry));
    let err = vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap_err();
    assert_eq!(
        err,
        VmError::Lookup(LookupError::RemovedMemberInvoked {
            type_name: "basic.FirstClass".to_string(),
            signature: "run()I".to_string(),
        })
    );

    // bringing it back makes it callable again
    ty.reload("003", &answer("basic.FirstClass", 5)).unwrap();
    assert_eq!(vm.invoke_static("basic.FirstClass", "run()I", &[]).unwrap(), Value::I32(5));
}

#[test]
fn test_field_retype_rejected_without_side_effects() {
    let registry = registry();
    let v1 = UnitBuilder::new("basic.Holder")
        .field("value", "I", 0)
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(1).ret();
        })
        .encode()
        .unwrap();
    let ty = registry.register("basic.Holder", &v1).unwrap();

    let v2 = UnitBuilder::new("basic.Holder")
        .field("value", "D", 0)
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(2).ret();
        })
        .encode()
        .unwrap();
    let err = ty.reload("002", &v2).unwrap_err();
    assert_eq!(err.type_name, "basic.Holder");
    assert_eq!(err.label, "002");
    assert!(matches!(
        err.reason,
        RejectReason::IncompatibleFieldRetype { ref field, .. } if field == "value"
    ));

    assert_eq!(ty.version_count(), 1);
    let vm = Vm::new(Arc::clone(&registry));
    assert_eq!(vm.invoke_static("basic.Holder", "run()I", &[]).unwrap(), Value::I32(1));

    // the label was not consumed
    ty.reload("002", &answer_with_value_field(3)).unwrap();
    assert_eq!(vm.invoke_static("basic.Holder", "run()I", &[]).unwrap(), Value::I32(3));
}

fn answer_with_value_field(value: i32) -> Vec<u8> {
    UnitBuilder::new("basic.Holder")
        .field("value", "I", 0)
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(value).ret();
        })
        .encode()
        .unwrap()
}

#[test]
fn test_method_kind_change_rejected() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();
    let v2 = UnitBuilder::new("basic.FirstClass")
        .method("run()I", 0, 1, |b| {
            b.const_i32(9).ret();
        })
        .encode()
        .unwrap();
    assert_eq!(
        ty.reload("002", &v2).unwrap_err().reason,
        RejectReason::IncompatibleMethodKind("run()I".to_string())
    );
}

#[test]
fn test_duplicate_label_rejected() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();
    ty.reload("002", &answer("basic.FirstClass", 9)).unwrap();

    let err = ty.reload("002", &answer("basic.FirstClass", 10)).unwrap_err();
    assert_eq!(err.reason, RejectReason::DuplicateVersionLabel("002".to_string()));
    assert_eq!(ty.version_count(), 2);
}

#[test]
fn test_malformed_reload_rejected() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();

    let mut truncated = answer("basic.FirstClass", 9);
    truncated.truncate(truncated.len() / 2);
    assert!(matches!(
        ty.reload("002", &truncated).unwrap_err().reason,
        RejectReason::MalformedUnit(_)
    ));

    assert!(matches!(
        ty.reload("002", &answer("basic.Elsewhere", 9)).unwrap_err().reason,
        RejectReason::NameMismatch { .. }
    ));
    assert_eq!(ty.version_count(), 1);
}

#[test]
fn test_duplicate_registration() {
    let registry = registry();
    registry.register("basic.FirstClass", &answer("basic.FirstClass", 8)).unwrap();
    assert_eq!(
        registry
            .register("basic.FirstClass", &answer("basic.FirstClass", 9))
            .unwrap_err(),
        RegistryError::DuplicateRegistration("basic.FirstClass".to_string())
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_malformed_registration() {
    let registry = registry();
    assert!(matches!(
        registry.register("basic.FirstClass", b"HSWP but not really"),
        Err(RegistryError::MalformedUnit { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_unregistered_callee_is_unresolved() {
    let registry = registry();
    let caller = UnitBuilder::new("basic.Caller")
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.invoke_static("basic.Missing", "run()I").ret();
        })
        .encode()
        .unwrap();
    assert_eq!(
        registry.register("basic.Caller", &caller).unwrap_err(),
        RegistryError::UnresolvedSibling {
            from: "basic.Caller".to_string(),
            missing: "basic.Missing".to_string(),
        }
    );
    assert!(registry.get("basic.Caller").is_none());
}

#[test]
fn test_scope_reload_all() {
    let registry = registry();
    registry.register("basic.A", &answer("basic.A", 1)).unwrap();
    registry.register("basic.B", &answer("basic.B", 2)).unwrap();
    registry.register("other.C", &answer("other.C", 3)).unwrap();

    let scope = registry.resolve("basic.*").unwrap();
    assert_eq!(scope.types().len(), 2);

    let touched = scope
        .reload_all(
            "002",
            vec![
                ("basic.A", answer("basic.A", 10)),
                ("basic.B", answer("basic.B", 20)),
                ("basic.D", answer("basic.D", 40)),
            ],
        )
        .unwrap();
    assert_eq!(touched.len(), 3);

    let vm = Vm::new(Arc::clone(&registry));
    assert_eq!(vm.invoke_static("basic.A", "run()I", &[]).unwrap(), Value::I32(10));
    assert_eq!(vm.invoke_static("basic.B", "run()I", &[]).unwrap(), Value::I32(20));
    assert_eq!(vm.invoke_static("basic.D", "run()I", &[]).unwrap(), Value::I32(40));
    // newly registered types start at their initial version
    assert_eq!(registry.get("basic.D").unwrap().version_count(), 1);

    let err = scope
        .reload_all("003", vec![("other.C", answer("other.C", 30))])
        .unwrap_err();
    assert!(matches!(err, RegistryError::OutOfScope { .. }));
    assert_eq!(vm.invoke_static("other.C", "run()I", &[]).unwrap(), Value::I32(3));
}

#[test]
fn test_version_history_is_kept() {
    let registry = registry();
    let ty = registry.register("basic.FirstClass", &answer("basic.FirstClass", 1)).unwrap();
    for (i, label) in ["002", "003", "004"].iter().enumerate() {
        ty.reload(label, &answer("basic.FirstClass", i as i32 + 2)).unwrap();
    }

    let labels: Vec<String> = ty.versions().iter().map(|v| v.label.clone()).collect();
    assert_eq!(labels, vec![INITIAL_LABEL, "002", "003", "004"]);
    assert_eq!(ty.current_version().index, 3);
    assert_ne!(
        ty.versions()[0].descriptor.digest,
        ty.versions()[3].descriptor.digest
    );
}
