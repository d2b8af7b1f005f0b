//! Line framer benchmark suite.
//!
//! Measures splitting of received data into lines:
//! - Whole lines per chunk
//! - Lines split across small chunks
//!
//! Run with: cargo bench --bench line_framer
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use linesock::connection::{LineFramer, format_line};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const LINE_COUNTS: &[usize] = &[100, 1_000];
const CHUNK_SIZES: &[usize] = &[16, 512];

fn sample_stream(lines: usize) -> Vec<u8> {
    (0..lines)
        .map(|i| format_line(&format!(":nick!user@host PRIVMSG #channel :message number {i}")))
        .collect::<String>()
        .into_bytes()
}

// ============================================================================
// Benchmark: Whole Buffer
// ============================================================================

fn bench_whole_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer_whole");

    for &count in LINE_COUNTS {
        let stream = sample_stream(count);
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::new("lines", count), &stream, |b, stream| {
            b.iter(|| {
                let mut framer = LineFramer::new();
                framer.push(stream).len()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Chunked
// ============================================================================

fn bench_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("framer_chunked");
    let stream = sample_stream(1_000);
    group.throughput(Throughput::Bytes(stream.len() as u64));

    for &size in CHUNK_SIZES {
        group.bench_with_input(BenchmarkId::new("chunk", size), &size, |b, &size| {
            b.iter(|| {
                let mut framer = LineFramer::new();
                stream
                    .chunks(size)
                    .map(|chunk| framer.push(chunk).len())
                    .sum::<usize>()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Main
// ============================================================================

criterion_group!(benches, bench_whole_buffer, bench_chunked);
criterion_main!(benches);
