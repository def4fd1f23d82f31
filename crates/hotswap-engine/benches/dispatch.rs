use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hotswap_engine::{RegistryConfig, TypeRegistry, Vm};
use hotswap_unit::{method_flags, Opcode, UnitBuilder};
use std::sync::Arc;

fn answer(value: i32) -> Vec<u8> {
    UnitBuilder::new("bench.Answer")
        .method("run()I", method_flags::STATIC, 0, |b| {
            b.const_i32(value).ret();
        })
        .encode()
        .unwrap()
}

fn counter() -> Vec<u8> {
    let owner = "bench.Counter";
    UnitBuilder::new(owner)
        .field("count", "I", 0)
        .method("bump()I", 0, 1, |b| {
            b.load(0)
                .load(0)
                .get_field(owner, "count")
                .const_i32(1)
                .op(Opcode::Iadd)
                .put_field(owner, "count")
                .load(0)
                .get_field(owner, "count")
                .ret();
        })
        .encode()
        .unwrap()
}

fn counter_v2() -> Vec<u8> {
    let owner = "bench.Counter";
    UnitBuilder::new(owner)
        .field("count", "I", 0)
        .field("bumps", "I", 0)
        .method("bump()I", 0, 1, |b| {
            b.load(0)
                .load(0)
                .get_field(owner, "bumps")
                .const_i32(1)
                .op(Opcode::Iadd)
                .put_field(owner, "bumps")
                .load(0)
                .get_field(owner, "bumps")
                .ret();
        })
        .encode()
        .unwrap()
}

fn bench_static_dispatch(c: &mut Criterion) {
    let registry = TypeRegistry::new(RegistryConfig::default());
    let ty = registry.register("bench.Answer", &answer(8)).unwrap();
    let vm = Vm::new(Arc::clone(&registry));

    let mut group = c.benchmark_group("static_dispatch");
    group.bench_function(BenchmarkId::new("run", "initial"), |b| {
        b.iter(|| vm.invoke_static(black_box("bench.Answer"), "run()I", &[]).unwrap());
    });
    ty.reload("v2", &answer(9)).unwrap();
    group.bench_function(BenchmarkId::new("run", "reloaded"), |b| {
        b.iter(|| vm.invoke_static(black_box("bench.Answer"), "run()I", &[]).unwrap());
    });
    group.finish();
}

fn bench_field_access(c: &mut Criterion) {
    let registry = TypeRegistry::new(RegistryConfig::default());
    let ty = registry.register("bench.Counter", &counter()).unwrap();
    let vm = Vm::new(Arc::clone(&registry));
    let object = vm.new_instance("bench.Counter").unwrap();

    let mut group = c.benchmark_group("field_access");
    group.bench_function("baseline_slot", |b| {
        b.iter(|| vm.invoke_virtual(&object, "bump()I", &[]).unwrap());
    });
    ty.reload("v2", &counter_v2()).unwrap();
    group.bench_function("extension_field", |b| {
        b.iter(|| vm.invoke_virtual(&object, "bump()I", &[]).unwrap());
    });
    group.finish();
}

fn bench_reload(c: &mut Criterion) {
    let registry = TypeRegistry::new(RegistryConfig::default());
    let ty = registry.register("bench.Answer", &answer(0)).unwrap();
    let bodies: Vec<Vec<u8>> = (1..=2).map(answer).collect();
    let mut n = 0u64;

    c.bench_function("reload", |b| {
        b.iter(|| {
            n += 1;
            let bytes = &bodies[(n % 2) as usize];
            ty.reload(&n.to_string(), black_box(bytes)).unwrap();
        });
    });
}

criterion_group!(benches, bench_static_dispatch, bench_field_access, bench_reload);
criterion_main!(benches);
