//! Interpreter throughput baselines. Each benchmark assembles a small module with the
//! same hand-rolled assembler the integration tests use (§1's external low-IR generator
//! stands between a real host and this wire format; benchmarking it directly would
//! measure someone else's code) and times repeated calls into it.

#[path = "../tests/common/mod.rs"]
mod common;

#[cfg(codspeed)]
use codspeed_criterion_compat::{black_box, criterion_group, criterion_main, Criterion};
#[cfg(not(codspeed))]
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use common::{build_module, Asm, FnDef};
use linguine::Runtime;

/// `x = 1; y = 2; return x + y;` — baseline per-call dispatch overhead with no loop.
fn add_two_locals_module() -> Vec<u8> {
    let mut main = Asm::new();
    main.iconst(0, 1);
    main.iconst(1, 2);
    main.add(2, 0, 1);
    main.store_symbol("$return", 2);
    build_module("bench_add.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 3, code: main.finish() }])
}

/// Sums `1 + 2` a thousand times in a loop, so the measured cost is dominated by
/// dispatch and jump handling rather than one-shot setup.
fn add_loop_1000_module() -> Vec<u8> {
    let mut main = Asm::new();
    main.iconst(0, 0); // i
    main.iconst(1, 0); // total
    main.iconst(2, 1000); // limit
    let loop_start = main.label();
    let loop_end = main.label();
    main.bind(loop_start);
    main.lt(3, 0, 2);
    main.jmp_if_false(3, loop_end);
    main.iconst(4, 1);
    main.iconst(5, 2);
    main.add(6, 4, 5);
    main.add(1, 1, 6);
    main.inc(0);
    main.jmp(loop_start);
    main.bind(loop_end);
    main.store_symbol("$return", 1);
    build_module("bench_loop.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 7, code: main.finish() }])
}

/// Grows an array to 1000 elements via repeated `STOREARRAY`, touching allocation,
/// growth, and the promotion check on every write.
fn array_growth_module() -> Vec<u8> {
    let mut main = Asm::new();
    main.aconst(0); // a
    main.iconst(1, 0); // i
    main.iconst(2, 1000); // limit
    let loop_start = main.label();
    let loop_end = main.label();
    main.bind(loop_start);
    main.lt(3, 1, 2);
    main.jmp_if_false(3, loop_end);
    main.store_array(0, 1, 1);
    main.inc(1);
    main.jmp(loop_start);
    main.bind(loop_end);
    main.store_symbol("$return", 1);
    build_module("bench_array.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 4, code: main.finish() }])
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("add_two_locals", |b| {
        let mut rt = Runtime::create();
        rt.register_bytecode(&add_two_locals_module()).unwrap();
        b.iter(|| black_box(rt.call_by_name("main", &[]).unwrap()));
    });

    c.bench_function("add_loop_1000", |b| {
        let mut rt = Runtime::create();
        rt.register_bytecode(&add_loop_1000_module()).unwrap();
        b.iter(|| black_box(rt.call_by_name("main", &[]).unwrap()));
    });

    c.bench_function("array_growth_1000", |b| {
        let mut rt = Runtime::create();
        rt.register_bytecode(&array_growth_module()).unwrap();
        b.iter(|| {
            black_box(rt.call_by_name("main", &[]).unwrap());
            rt.collect_garbage();
        });
    });
}

#[cfg(not(codspeed))]
criterion_group!(benches, criterion_benchmark);
#[cfg(codspeed)]
criterion_group!(benches, criterion_benchmark);

criterion_main!(benches);
