//! hyperloop - Lock-Free Single-Producer Multi-Consumer Broadcast Channel
//!
//! A fixed-capacity ring of 64-bit values built directly over one raw,
//! page-aligned memory arena. One producer publishes; every registered
//! consumer reads every value at its own pace, and the producer is held back
//! by the slowest of them.
//!
//! # Key Features
//!
//! - Header fields on separate 128-byte lines (no false sharing between the
//!   producer cursor, the cached minimum and each consumer cursor)
//! - Acquire/release cursor protocol, no locks on the send/receive path
//! - Cached slowest-consumer cursor, rescanned only when the ring looks full
//! - Spin-then-yield blocking variants with optional cancellation or timeout
//! - Pluggable [`MemoryProvider`] for the arena (global allocator by default,
//!   anonymous `mmap` behind the `mmap` feature)
//!
//! # Example
//!
//! ```
//! use hyperloop_rs::{Channel, ChannelError};
//!
//! let channel = Channel::new(512).unwrap();
//! let mut consumer = channel.create_consumer().unwrap();
//!
//! // Non-blocking: false means the ring is full, retry later
//! assert!(channel.send(42));
//!
//! // Blocking: waits for the slowest consumer to make room
//! channel.send_to(43);
//!
//! assert_eq!(consumer.receive(), Ok(42));
//! assert_eq!(consumer.receive_blocking(), 43);
//! assert_eq!(consumer.receive(), Err(ChannelError::EmptyChannel));
//! ```

mod arena;
mod backoff;
mod cancel;
mod channel;
mod config;
mod consumer;
mod error;
mod invariants;
mod layout;
mod memory;
mod metrics;

pub use backoff::Backoff;
pub use cancel::CancelToken;
pub use channel::Channel;
pub use config::{
    Config, DEFAULT_CAPACITY, DEFAULT_MAX_CONSUMERS, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG,
    MIN_CAPACITY,
};
pub use consumer::Consumer;
pub use error::ChannelError;
pub use layout::{CACHE_LINE, PAGE_SIZE};
#[cfg(all(feature = "mmap", unix))]
pub use memory::MmapMemory;
pub use memory::{MemoryProvider, SystemMemory};
pub use metrics::{Metrics, MetricsSnapshot};
