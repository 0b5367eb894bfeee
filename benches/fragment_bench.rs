use std::net::SocketAddr;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;
use udp_session::core::codec::TaggedCodec;
use udp_session::core::fragment::{fragment_payload, Reassembly};

#[allow(clippy::unwrap_used)]
fn bench_fragment_reassemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_reassemble");
    let codec = TaggedCodec::default();
    let peer: SocketAddr = "127.0.0.1:9877".parse().unwrap();

    for &size in &[512usize, 1020, 1021, 64 * 1024, 1024 * 1024] {
        let mut payload = vec![0u8; size];
        rand::rng().fill(&mut payload[..]);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("fragment_{size}b"), |b| {
            b.iter(|| fragment_payload(black_box(&payload), &codec).unwrap())
        });

        let datagrams = fragment_payload(&payload, &codec).unwrap();
        group.bench_function(format!("reassemble_{size}b"), |b| {
            b.iter(|| {
                let mut reassembly = Reassembly::begin(peer, &datagrams[0], &codec).unwrap();
                for continuation in &datagrams[1..] {
                    reassembly.push(continuation).unwrap();
                }
                reassembly.into_payload().unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fragment_reassemble);
criterion_main!(benches);
