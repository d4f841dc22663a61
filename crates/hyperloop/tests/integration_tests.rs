//! End-to-end tests across threads and memory providers.

use hyperloop_rs::{
    CancelToken, Channel, ChannelError, Config, MemoryProvider, SystemMemory, PAGE_SIZE,
};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Provider that counts allocate/free calls and forwards to the system heap.
#[derive(Debug, Default, Clone)]
struct CountingMemory {
    allocs: Arc<AtomicUsize>,
    frees: Arc<AtomicUsize>,
}

impl MemoryProvider for CountingMemory {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, ChannelError> {
        self.allocs.fetch_add(1, Ordering::SeqCst);
        SystemMemory.allocate(bytes)
    }

    unsafe fn free(&self, base: NonNull<u8>, bytes: usize) {
        self.frees.fetch_add(1, Ordering::SeqCst);
        unsafe { SystemMemory.free(base, bytes) };
    }
}

/// Provider that always reports out-of-memory.
struct ExhaustedMemory;

impl MemoryProvider for ExhaustedMemory {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, ChannelError> {
        Err(ChannelError::AllocationFailure { bytes })
    }

    unsafe fn free(&self, _base: NonNull<u8>, _bytes: usize) {
        unreachable!("nothing was ever allocated");
    }
}

/// One producer with `send_to`, `consumers` readers with `receive_blocking`.
fn run_stress(capacity: usize, consumers: usize, messages: u64) {
    let config = Config::default()
        .with_capacity(capacity)
        .with_max_consumers(consumers);
    let channel = Channel::with_config(config).unwrap();
    let handles: Vec<_> = (0..consumers)
        .map(|_| channel.create_consumer().unwrap())
        .collect();

    thread::scope(|s| {
        let readers: Vec<_> = handles
            .into_iter()
            .map(|mut consumer| {
                s.spawn(move || {
                    let mut received = 0u64;
                    for expected in 0..messages {
                        let value = consumer.receive_blocking();
                        assert_eq!(
                            value,
                            expected,
                            "consumer {} out of order",
                            consumer.id()
                        );
                        received += 1;
                    }
                    assert!(consumer.not_receivable());
                    received
                })
            })
            .collect();

        for value in 0..messages {
            channel.send_to(value);
        }

        for reader in readers {
            assert_eq!(reader.join().unwrap(), messages);
        }
    });

    assert_eq!(channel.write_position(), messages);
}

#[test]
fn test_stress_one_consumer() {
    run_stress(64, 1, 200_000);
}

#[test]
fn test_stress_four_consumers() {
    run_stress(128, 4, 100_000);
}

#[test]
fn test_stress_sixteen_consumers() {
    run_stress(256, 16, 50_000);
}

#[test]
fn test_nonblocking_producer_with_polling_consumers() {
    const MESSAGES: u64 = 50_000;
    let channel = Channel::new(32).unwrap();
    let consumers: Vec<_> = (0..3).map(|_| channel.create_consumer().unwrap()).collect();

    thread::scope(|s| {
        for mut consumer in consumers {
            s.spawn(move || {
                let mut next = 0;
                while next < MESSAGES {
                    if consumer.is_receivable() {
                        assert_eq!(consumer.receive(), Ok(next));
                        next += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            });
        }

        let mut value = 0;
        while value < MESSAGES {
            if channel.send(value) {
                value += 1;
            } else {
                thread::yield_now();
            }
        }
    });
}

#[test]
fn test_batch_consumers_keep_order() {
    const MESSAGES: u64 = 100_000;
    let channel = Channel::new(64).unwrap();
    let mut batcher = channel.create_consumer().unwrap();
    let mut visitor = channel.create_consumer().unwrap();

    thread::scope(|s| {
        s.spawn(move || {
            let mut out = [0u64; 16];
            let mut next = 0;
            while next < MESSAGES {
                let n = batcher.receive_batch(&mut out);
                for &v in &out[..n] {
                    assert_eq!(v, next);
                    next += 1;
                }
                if n == 0 {
                    thread::yield_now();
                }
            }
        });
        s.spawn(move || {
            let mut next = 0;
            while next < MESSAGES {
                let n = visitor.consume_available(|v| {
                    assert_eq!(v, next);
                    next += 1;
                });
                if n == 0 {
                    thread::yield_now();
                }
            }
        });

        for value in 0..MESSAGES {
            channel.send_to(value);
        }
    });
}

#[test]
fn test_consumer_registered_while_producing() {
    const MESSAGES: u64 = 20_000;
    let channel = Channel::new(16).unwrap();
    let mut first = channel.create_consumer().unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            for value in 0..MESSAGES {
                channel.send_to(value);
            }
        });

        // Read a while, then bring in a second consumer mid-stream
        for expected in 0..MESSAGES / 2 {
            assert_eq!(first.receive_blocking(), expected);
        }
        let mut late = channel.create_consumer().unwrap();
        let start = late.position();

        s.spawn(move || {
            for expected in start..MESSAGES {
                assert_eq!(late.receive_blocking(), expected);
            }
        });

        for expected in MESSAGES / 2..MESSAGES {
            assert_eq!(first.receive_blocking(), expected);
        }
    });
}

#[test]
fn test_cancel_unblocks_stalled_producer() {
    let channel = Channel::new(8).unwrap();
    let _stalled = channel.create_consumer().unwrap();
    for value in 0..8 {
        assert!(channel.send(value));
    }

    let token = CancelToken::new();
    thread::scope(|s| {
        let producer = s.spawn(|| channel.send_to_cancellable(8, &token));
        thread::sleep(Duration::from_millis(10));
        token.cancel();
        assert_eq!(producer.join().unwrap(), Err(ChannelError::Cancelled));
    });
    assert_eq!(channel.write_position(), 8);
}

#[test]
fn test_registration_is_serialized() {
    let config = Config::default().with_capacity(8).with_max_consumers(64);
    let channel = Channel::with_config(config).unwrap();

    let ids: Vec<usize> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    (0..8)
                        .map(|_| channel.create_consumer().unwrap().id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted, (0..64).collect::<Vec<_>>());
    assert_eq!(channel.consumer_count(), 64);
}

#[test]
fn test_disposal_frees_arena_once() {
    let provider = CountingMemory::default();
    let channel = Channel::with_provider(Config::default(), provider.clone()).unwrap();
    assert_eq!(channel.base_address() % PAGE_SIZE, 0);
    assert_eq!(provider.allocs.load(Ordering::SeqCst), 1);

    {
        let mut consumer = channel.create_consumer().unwrap();
        channel.send_to(1);
        assert_eq!(consumer.receive(), Ok(1));
    }
    assert_eq!(provider.frees.load(Ordering::SeqCst), 0);

    channel.dispose();
    assert_eq!(provider.frees.load(Ordering::SeqCst), 1);
}

#[test]
fn test_allocation_failure_surfaces_at_construction() {
    let err = Channel::with_provider(Config::default(), ExhaustedMemory).unwrap_err();
    assert!(matches!(err, ChannelError::AllocationFailure { .. }));
    assert!(err.is_construction_error());
}

#[test]
fn test_contract_violation_allocates_nothing() {
    let provider = CountingMemory::default();
    let err = Channel::with_provider(Config::default().with_capacity(10), provider.clone())
        .unwrap_err();
    assert!(matches!(err, ChannelError::ContractViolation { .. }));
    assert_eq!(provider.allocs.load(Ordering::SeqCst), 0);
}
