//! Integration tests for the circular buffer and the command buffer queue.

use kiln_core::{AllocationStrategy, BufferMode, BufferRange, CircularBuffer, CommandBufferQueue, PageSize};
use std::thread;

#[test]
fn test_hard_mode_aliases_across_wrap() {
    let mut buffer = CircularBuffer::new(64 * 1024, PageSize::query());
    if !buffer.is_hard() {
        return;
    }
    assert_eq!(buffer.mode(), BufferMode::Hard);
    let size = buffer.size();

    let _ = buffer.allocate(size - 8);
    let _ = buffer.get_buffer();

    let pattern: Vec<u8> = (0..16).collect();
    buffer.allocate(16).copy_from_slice(&pattern);
    let range = buffer.get_buffer();
    assert_eq!(range, BufferRange { begin: size - 8, end: size + 8 });
    assert_eq!(buffer.read(range), pattern.as_slice());

    // Bytes written past `size` are visible at the start of the primary copy.
    assert_eq!(buffer.read(BufferRange { begin: 0, end: 8 }), &pattern[8..]);
    assert_eq!(buffer.head(), 8);
}

#[test]
fn test_soft_strategy_never_aliases() {
    let mut buffer = CircularBuffer::try_new(4096, PageSize::query(), AllocationStrategy::Soft).unwrap();
    assert!(!buffer.is_hard());
    let size = buffer.size();

    let _ = buffer.allocate(size - 4);
    let _ = buffer.get_buffer();
    buffer.allocate(8).fill(0xEE);
    let range = buffer.get_buffer();

    assert_eq!(buffer.read(range), &[0xEE; 8]);
    assert_eq!(buffer.read(BufferRange { begin: 0, end: 4 }), &[0; 4]);
    assert_eq!(buffer.head(), 0);
}

#[test]
fn test_heap_strategy_wraps_to_start() {
    let mut buffer = CircularBuffer::try_new(4096, PageSize::query(), AllocationStrategy::Heap).unwrap();
    assert_eq!(buffer.mode(), BufferMode::Heap);
    let size = buffer.size();

    let _ = buffer.allocate(size);
    let range = buffer.get_buffer();
    assert_eq!(range.len(), size);
    assert_eq!((buffer.head(), buffer.tail()), (0, 0));
}

/// Records `frames` frames of sequence-numbered u32 commands on this thread
/// while a driver thread checks and releases them.
fn run_stream(strategy: AllocationStrategy, frames: u32) {
    const WORDS_PER_FRAME: u32 = 300;
    let (mut producer, consumer) =
        CommandBufferQueue::try_create(2048, 8192, PageSize::FALLBACK, strategy).unwrap();

    let driver = {
        let consumer = consumer.clone();
        thread::spawn(move || {
            let mut expected = 0_u32;
            loop {
                let slices = consumer.wait_for_commands();
                // Empty only once exit was requested and everything was drained.
                if slices.is_empty() {
                    return expected;
                }
                for slice in slices {
                    for chunk in slice.as_bytes().chunks_exact(4) {
                        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        assert_eq!(word, expected);
                        expected += 1;
                    }
                    consumer.release_buffer(slice);
                }
            }
        })
    };

    let mut sequence = 0_u32;
    for _ in 0..frames {
        for _ in 0..WORDS_PER_FRAME {
            producer.write_pod(&sequence);
            sequence += 1;
        }
        producer.flush();
    }
    producer.request_exit();

    assert_eq!(driver.join().unwrap(), sequence);
    assert!(consumer.high_watermark() <= producer.buffer().size());
}

#[test]
fn test_stream_survives_many_wraps() {
    run_stream(AllocationStrategy::Auto, 200);
}

#[test]
fn test_soft_stream_survives_many_wraps() {
    run_stream(AllocationStrategy::Soft, 200);
}

#[test]
fn test_pause_holds_commands_back() {
    let (mut producer, consumer) = CommandBufferQueue::create(64, 4096, PageSize::query());
    consumer.set_paused(true);
    producer.write_pod(&1_u64);
    producer.flush();

    let waiter = {
        let consumer = consumer.clone();
        thread::spawn(move || consumer.wait_for_commands().len())
    };
    assert!(consumer.is_paused());
    consumer.set_paused(false);
    assert_eq!(waiter.join().unwrap(), 1);
}
