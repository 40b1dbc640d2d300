//! Criterion benchmarks for the envelope codec and multipart framing.
//!
//! Run with:
//! ```bash
//! cargo bench --package wsbridge-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use wsbridge_core::{decode_multipart, encode_multipart, ConnectionId, Envelope, PacketCodec};

// ── Envelope fixtures ─────────────────────────────────────────────────────────

fn make_small_text() -> Envelope {
    Envelope::tagged(ConnectionId::new(), json!("hello"))
}

fn make_structured() -> Envelope {
    Envelope::tagged(
        ConnectionId::new(),
        json!({"type": "chat", "room": "general", "body": "hi there", "seq": 42}),
    )
}

fn make_large_raw() -> Envelope {
    Envelope::untagged(vec![0xAB; 64 * 1024])
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let cases: &[(&str, PacketCodec, Envelope)] = &[
        ("SmallText", PacketCodec::multiplexed(), make_small_text()),
        ("Structured", PacketCodec::multiplexed(), make_structured()),
        ("LargeRaw", PacketCodec::single(), make_large_raw()),
    ];

    let mut group = c.benchmark_group("encode");
    for (name, codec, envelope) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), envelope, |b, env| {
            b.iter(|| codec.encode(black_box(env)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode_from_wire(c: &mut Criterion) {
    let cases: &[(&str, PacketCodec, Envelope)] = &[
        ("SmallText", PacketCodec::multiplexed(), make_small_text()),
        ("Structured", PacketCodec::multiplexed(), make_structured()),
        ("LargeRaw", PacketCodec::single(), make_large_raw()),
    ];

    let mut group = c.benchmark_group("decode_from_wire");
    for (name, codec, envelope) in cases {
        let frames = codec.encode(envelope).unwrap().into_frames();
        let bytes = encode_multipart(&frames).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| {
                let (frames, _) = decode_multipart(black_box(bytes)).unwrap();
                codec.decode_frames(frames).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode_from_wire);
criterion_main!(benches);
