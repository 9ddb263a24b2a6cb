//! # Command Buffer Benchmark
//!
//! Recording throughput into the circular buffer, per allocation mode, and
//! the round trip through the command buffer queue.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiln_core::{AllocationStrategy, CircularBuffer, CommandBufferQueue, PageSize};

const FRAME_BYTES: usize = 64 * 1024;

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("circular_buffer_record");
    group.throughput(Throughput::Bytes(FRAME_BYTES as u64));

    for (label, strategy) in [
        ("auto", AllocationStrategy::Auto),
        ("soft", AllocationStrategy::Soft),
        ("heap", AllocationStrategy::Heap),
    ] {
        let mut buffer = CircularBuffer::try_new(1024 * 1024, PageSize::query(), strategy)
            .expect("allocate circular buffer");

        group.bench_with_input(BenchmarkId::new("64_byte_commands", label), &(), |b, ()| {
            b.iter(|| {
                for _ in 0..FRAME_BYTES / 64 {
                    buffer.allocate(64).fill(0xC3);
                }
                black_box(buffer.get_buffer())
            });
        });
    }

    group.finish();
}

fn bench_flush_release(c: &mut Criterion) {
    let (mut producer, consumer) = CommandBufferQueue::create(FRAME_BYTES, 4 * FRAME_BYTES, PageSize::query());

    c.bench_function("command_queue_flush_release", |b| {
        b.iter(|| {
            for i in 0..(FRAME_BYTES / 8) as u64 {
                producer.write_pod(&i);
            }
            producer.flush();
            for slice in consumer.wait_for_commands() {
                black_box(slice.as_bytes().len());
                consumer.release_buffer(slice);
            }
        });
    });
}

criterion_group!(benches, bench_record, bench_flush_release);
criterion_main!(benches);
