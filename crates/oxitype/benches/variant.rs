// Variant benchmarks for OxiType
//
// These benchmarks measure variant construction, same-type and cross-type
// comparison, and conversions through the converter table.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use oxitype::{Registry, TypeId, Value, Variant};

/// Benchmark constructing scalar and string variants.
fn bench_construct(c: &mut Criterion) {
    let mut group = c.benchmark_group("construct");
    let registry = Registry::new();

    group.bench_function("from_u32", |b| {
        b.iter(|| Variant::from(black_box(42u32)));
    });
    group.bench_function("default_string", |b| {
        b.iter(|| Variant::construct_default(&registry, black_box(TypeId::STRING)).unwrap());
    });
    group.bench_function("value_copy_i64", |b| {
        let value = Value::I64(-7);
        b.iter(|| Variant::construct_value_copy(&registry, TypeId::INT64, black_box(&value)).unwrap());
    });

    group.finish();
}

/// Benchmark comparing variants of the same and of different types.
fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");
    let registry = Registry::new();

    let a = Variant::from(10i32);
    let b_same = Variant::from(11i32);
    let b_cross = Variant::from("10");

    group.bench_function("same_type", |b| {
        b.iter(|| a.compare(&registry, black_box(&b_same)).unwrap());
    });
    group.bench_function("int_vs_string", |b| {
        b.iter(|| a.compare(&registry, black_box(&b_cross)).unwrap());
    });

    group.finish();
}

/// Benchmark typed conversions by destination type.
fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");
    let registry = Registry::new();
    let source = Variant::from(123_456u64);

    for target in ["u8", "f64", "string"] {
        group.bench_with_input(BenchmarkId::from_parameter(target), &target, |b, &target| {
            b.iter(|| match target {
                "u8" => source.to_u8(&registry).map(|_| ()),
                "f64" => source.to_f64(&registry).map(|_| ()),
                _ => source.to_string(&registry).map(|_| ()),
            });
        });
    }

    group.bench_function("parse_string", |b| {
        let text = Variant::from("123456");
        b.iter(|| black_box(&text).to_u64(&registry).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_construct, bench_compare, bench_convert);
criterion_main!(benches);
