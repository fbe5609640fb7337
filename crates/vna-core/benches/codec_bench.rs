//! Criterion benchmarks for the byte ↔ code-point payload codec.
//!
//! Every chunk the analyzer sends passes through `encode_payload` and every
//! browser command through `decode_payload`, so both sit on the hot path of a
//! sweep.  A 101-point sweep at `data 0` returns roughly 4 KiB of ASCII; raw
//! `scanraw` captures are binary and larger.
//!
//! Run with:
//! ```bash
//! cargo bench --package vna-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vna_core::codec::{decode_payload, encode_payload};

// ── Payload fixtures ──────────────────────────────────────────────────────────

fn make_ascii_sweep(points: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..points {
        out.extend_from_slice(format!("{:.9} {:.9}\r\n", i as f64 * 1e-3, -(i as f64) * 1e-3).as_bytes());
    }
    out.extend_from_slice(b"ch> ");
    out
}

fn make_binary(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let payloads: &[(&str, Vec<u8>)] = &[
        ("command_echo", b"sweep 1000000 900000000 101\r\n".to_vec()),
        ("ascii_sweep_101", make_ascii_sweep(101)),
        ("binary_64k", make_binary(64 * 1024)),
    ];

    let mut group = c.benchmark_group("encode_payload");
    for (name, bytes) in payloads {
        group.bench_with_input(BenchmarkId::new("payload", name), bytes, |b, bytes| {
            b.iter(|| encode_payload(black_box(bytes)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let payloads: &[(&str, Vec<u8>)] = &[
        ("command", b"data 0\r".to_vec()),
        ("binary_64k", make_binary(64 * 1024)),
    ];

    let mut group = c.benchmark_group("decode_payload");
    for (name, bytes) in payloads {
        let text = encode_payload(bytes);
        group.bench_with_input(BenchmarkId::new("payload", name), &text, |b, text| {
            b.iter(|| decode_payload(black_box(text)).expect("decode must succeed"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
