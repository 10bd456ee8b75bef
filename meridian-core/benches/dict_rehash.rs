use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meridian_core::dict::Dict;

fn bench_insert_triggering_rehash(c: &mut Criterion) {
    c.bench_function("dict_insert_100k", |b| {
        b.iter(|| {
            let mut dict: Dict<u64, u64> = Dict::new();
            for i in 0..100_000u64 {
                dict.insert(i, i.wrapping_mul(31));
            }
            black_box(dict.len());
        });
    });
}

fn bench_find_during_rehash(c: &mut Criterion) {
    let mut dict: Dict<u64, u64> = Dict::new();
    for i in 0..200_000u64 {
        dict.insert(i, i);
    }

    c.bench_function("dict_find_steady_state", |b| {
        b.iter(|| {
            for i in 0..1000u64 {
                black_box(dict.get(&i));
            }
        });
    });
}

criterion_group!(benches, bench_insert_triggering_rehash, bench_find_during_rehash);
criterion_main!(benches);
