use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::Rng;
use tokio_util::codec::{Decoder, Encoder};
use udp_session::core::codec::{decode_tagged, encode_tagged, TaggedCodec};
use udp_session::Value;

fn sample_values(len: usize) -> Vec<(&'static str, Value)> {
    let mut rng = rand::rng();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);

    vec![
        ("bytes", Value::Bytes(bytes)),
        ("int_array", Value::IntArray((0..len / 4).map(|_| rng.random()).collect())),
        ("bool_array", Value::BoolArray((0..len * 8).map(|_| rng.random()).collect())),
        (
            "double_array",
            Value::DoubleArray((0..len / 8).map(|_| rng.random()).collect()),
        ),
    ]
}

#[allow(clippy::unwrap_used)]
fn bench_tagged_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("tagged_encode_decode");

    for &size in &[64usize, 1020, 16 * 1024] {
        for (name, value) in sample_values(size) {
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_function(format!("encode_{name}_{size}b"), |b| {
                b.iter(|| encode_tagged(black_box(&value)))
            });

            let payload = encode_tagged(&value);
            group.bench_function(format!("decode_{name}_{size}b"), |b| {
                b.iter(|| decode_tagged(black_box(&payload)).unwrap())
            });
        }
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_framed_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("framed_codec");
    let value = Value::Bytes(vec![7u8; 4096]);
    let mut frame = BytesMut::new();
    TaggedCodec::default().encode(&value, &mut frame).unwrap();

    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("encode_4096b", |b| {
        b.iter_batched(
            || BytesMut::with_capacity(4096 + 8),
            |mut buf| TaggedCodec::default().encode(&value, &mut buf).unwrap(),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("decode_4096b", |b| {
        b.iter_batched(
            || frame.clone(),
            |mut buf| TaggedCodec::default().decode(&mut buf).unwrap(),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_tagged_roundtrip, bench_framed_codec);
criterion_main!(benches);
