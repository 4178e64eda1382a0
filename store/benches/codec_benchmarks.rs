use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use txdb_store::codec::identity::{canonicalize_id, hash_canonical, IdSource};
use txdb_store::codec::value::Value;

fn bench_integer_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("integer_encoding");
    for n in [0i64, 1, -1, i64::MIN, i64::MAX] {
        group.bench_with_input(BenchmarkId::new("encode_long", n), &n, |b, n| {
            b.iter(|| Value::Long(black_box(*n)).encode().unwrap());
        });
    }
    group.finish();
}

fn bench_string_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_encoding");
    for len in [8usize, 64, 256] {
        let s = "x".repeat(len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("encode_str", len), &s, |b, s| {
            b.iter(|| Value::Str(black_box(s.clone())).encode().unwrap());
        });
    }
    group.finish();
}

fn bench_identity_hashing(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity_hashing");
    let doc = serde_json::json!({"name": "Pablo", "surname": "Picasso", "born": 1881});

    group.bench_function("hash_canonical_document", |b| {
        b.iter(|| hash_canonical(black_box(&doc)).unwrap());
    });

    group.bench_function("canonicalize_keyword_id", |b| {
        b.iter(|| canonicalize_id(black_box(IdSource::Keyword("picasso"))).unwrap());
    });

    group.finish();
}

criterion_group!(codec_benches, bench_integer_encoding, bench_string_encoding, bench_identity_hashing);
criterion_main!(codec_benches);
