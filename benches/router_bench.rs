use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use desarc::locate;

fn bench_router(c: &mut Criterion) {
    let uid = b"file-000001";
    let t = Utc::now();
    c.bench_function("locate_n_bits_8", |b| b.iter(|| locate(black_box(uid), t, 8).unwrap()));
    c.bench_function("locate_n_bits_16", |b| b.iter(|| locate(black_box(uid), t, 16).unwrap()));
}

criterion_group!(benches, bench_router);
criterion_main!(benches);
