use crate::arena::Arena;
use crate::invariants::{debug_assert_monotonic, debug_assert_within_ring};
use crate::layout::RingLayout;
use crate::{
    Backoff, CancelToken, ChannelError, Config, Consumer, MemoryProvider, Metrics,
    MetricsSnapshot, SystemMemory,
};
use std::convert::Infallible;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// All shared state lives in one arena (see `layout.rs`). Cursors are unbounded
// u64 sequence numbers; a slot index is `cursor & mask`.
//
// **Producer (send path):**
// 1. Load `min_read` with Acquire (cached slowest-consumer cursor)
// 2. Load `write` with Relaxed (only the producer writes it)
// 3. If `write - min_read >= capacity`: rescan consumer cursors (Acquire),
//    store the fresh minimum into `min_read`, report full
// 4. Store the value into its slot (Relaxed)
// 5. Store `write + 1` with Release (publishes the slot to consumers)
//
// **Consumer (receive path):**
// 1. Load `write` with Acquire (synchronizes with step 5 above)
// 2. Load the slot at `read & mask`
// 3. Store `read + 1` into its cursor line with Release (publishes that the
//    slot was consumed; the producer's Acquire rescan synchronizes with it)
//
// **Registration:**
// Serialized by a per-channel mutex. A new cursor is seeded, the count is
// published with Release, then both sides meet at a SeqCst fence: the
// registrar fences before re-reading `write`, the producer fences before every
// rescan. Either the rescan sees the new consumer, or the registrar's re-read
// sees a write cursor at least as far as any minimum that rescan computed, so
// the producer can never lap the new consumer's start position.
//
// =============================================================================

/// Single-producer, multi-consumer broadcast ring of 64-bit values.
///
/// Every registered [`Consumer`] observes every value published after it
/// joined, in publish order. The producer is held back by the slowest
/// consumer: it never overwrites a slot that a registered consumer has not
/// read yet.
///
/// Exactly one thread may call the `send*` methods at a time. That is a caller
/// contract; slots are atomic words, so breaking it scrambles ordering but
/// never memory safety.
///
/// # Example
///
/// ```
/// use hyperloop_rs::Channel;
///
/// let channel = Channel::new(8).unwrap();
/// let mut a = channel.create_consumer().unwrap();
/// let mut b = channel.create_consumer().unwrap();
///
/// assert!(channel.send(7));
/// assert_eq!(a.receive(), Ok(7));
/// assert_eq!(b.receive(), Ok(7));
/// ```
pub struct Channel<M: MemoryProvider = SystemMemory> {
    arena: Arena<M>,
    layout: RingLayout,
    config: Config,
    /// Serializes consumer registration for this channel only
    registration: Mutex<()>,
    metrics: Metrics,
}

impl Channel<SystemMemory> {
    /// Creates a channel with `capacity` slots on the global allocator.
    ///
    /// Fails with [`ChannelError::ContractViolation`] when `capacity` is below
    /// 8 or not a power of two.
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        Self::with_config(Config::default().with_capacity(capacity))
    }

    /// Creates a channel with the default 512 slots.
    pub fn with_default_capacity() -> Result<Self, ChannelError> {
        Self::with_config(Config::default())
    }

    /// Creates a channel from a full configuration on the global allocator.
    pub fn with_config(config: Config) -> Result<Self, ChannelError> {
        Self::with_provider(config, SystemMemory)
    }
}

impl<M: MemoryProvider> Channel<M> {
    /// Creates a channel whose arena comes from `provider`.
    pub fn with_provider(config: Config, provider: M) -> Result<Self, ChannelError> {
        config.validate()?;
        let layout = RingLayout::new(&config)?;
        let arena = Arena::new(provider, layout.total_bytes())?;

        let channel = Self {
            arena,
            layout,
            config,
            registration: Mutex::new(()),
            metrics: Metrics::new(),
        };

        // The arena is zeroed already; stores keep the start state explicit.
        channel.write_word().store(0, Ordering::Relaxed);
        channel.min_read_word().store(0, Ordering::Relaxed);
        channel.count_word().store(0, Ordering::Release);

        tracing::debug!(
            capacity = config.capacity,
            max_consumers = config.max_consumers,
            arena_bytes = layout.total_bytes(),
            "hyperloop channel created"
        );

        Ok(channel)
    }

    // ---------------------------------------------------------------------
    // ARENA FIELDS
    // ---------------------------------------------------------------------

    #[inline]
    pub(crate) fn write_word(&self) -> &AtomicU64 {
        self.arena.u64_at(self.layout.write_cursor())
    }

    #[inline]
    fn min_read_word(&self) -> &AtomicU64 {
        self.arena.u64_at(self.layout.min_read_cursor())
    }

    #[inline]
    fn count_word(&self) -> &AtomicU32 {
        self.arena.u32_at(self.layout.consumer_count())
    }

    #[inline]
    pub(crate) fn cursor_word(&self, index: usize) -> &AtomicU64 {
        self.arena.u64_at(self.layout.consumer_cursor(index))
    }

    #[inline]
    pub(crate) fn slot_word(&self, position: u64) -> &AtomicU64 {
        self.arena.u64_at(self.layout.slot(position))
    }

    // ---------------------------------------------------------------------
    // STATUS
    // ---------------------------------------------------------------------

    /// Returns the number of slots in the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Returns the size of the consumer cursor table.
    #[inline]
    pub fn max_consumers(&self) -> usize {
        self.config.max_consumers
    }

    /// Returns the number of registered consumers.
    #[inline]
    pub fn consumer_count(&self) -> usize {
        self.count_word().load(Ordering::Acquire) as usize
    }

    /// Returns the number of values published so far.
    #[inline]
    pub fn write_position(&self) -> u64 {
        self.write_word().load(Ordering::Acquire)
    }

    /// Returns the configuration this channel was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address of the page-aligned arena base.
    pub fn base_address(&self) -> usize {
        self.arena.base_addr()
    }

    /// Get a snapshot of metrics if enabled.
    pub fn metrics(&self) -> MetricsSnapshot {
        if self.config.enable_metrics {
            self.metrics.snapshot()
        } else {
            MetricsSnapshot::default()
        }
    }

    #[inline]
    fn is_full(&self, write: u64, min_read: u64) -> bool {
        write.wrapping_sub(min_read) >= self.config.capacity as u64
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Publishes `value` if the ring has room. Never blocks.
    ///
    /// Returns `false` without writing anything when the slowest consumer is
    /// a full ring behind. That call also refreshes the cached minimum, so a
    /// retry after consumers have moved on succeeds.
    #[inline]
    pub fn send(&self, value: u64) -> bool {
        let min_read = self.min_read_word().load(Ordering::Acquire);
        let write = self.write_word().load(Ordering::Relaxed);

        if self.is_full(write, min_read) {
            self.refresh_min_read();
            if self.config.enable_metrics {
                self.metrics.add_full_rejection();
            }
            return false;
        }

        self.publish(write, min_read, value);
        true
    }

    /// Publishes `value`, spinning and yielding until the ring has room.
    ///
    /// There is no timeout: a consumer that stops reading stalls this call
    /// forever. Use [`send_timeout`](Self::send_timeout) or
    /// [`send_to_cancellable`](Self::send_to_cancellable) for a bounded wait.
    pub fn send_to(&self, value: u64) {
        match self.send_waiting(value, || Ok::<(), Infallible>(())) {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Like [`send_to`](Self::send_to), but gives up with
    /// [`ChannelError::Cancelled`] once `token` is cancelled.
    pub fn send_to_cancellable(&self, value: u64, token: &CancelToken) -> Result<(), ChannelError> {
        self.send_waiting(value, || {
            if token.is_cancelled() {
                Err(ChannelError::Cancelled)
            } else {
                Ok(())
            }
        })
    }

    /// Like [`send_to`](Self::send_to), but gives up with
    /// [`ChannelError::Timeout`] after `timeout`.
    pub fn send_timeout(&self, value: u64, timeout: Duration) -> Result<(), ChannelError> {
        let deadline = Instant::now() + timeout;
        self.send_waiting(value, || {
            if Instant::now() >= deadline {
                Err(ChannelError::Timeout)
            } else {
                Ok(())
            }
        })
    }

    /// Waits for room, checking `keep_waiting` once per backoff round.
    fn send_waiting<E>(
        &self,
        value: u64,
        mut keep_waiting: impl FnMut() -> Result<(), E>,
    ) -> Result<(), E> {
        let write = self.write_word().load(Ordering::Relaxed);
        let mut min_read = self.min_read_word().load(Ordering::Acquire);
        let mut backoff = Backoff::new();

        while self.is_full(write, min_read) {
            min_read = self.refresh_min_read();
            if !self.is_full(write, min_read) {
                break;
            }
            keep_waiting()?;
            backoff.snooze();
        }

        self.publish(write, min_read, value);
        Ok(())
    }

    /// Writes the slot and releases the advanced write cursor.
    #[inline]
    fn publish(&self, write: u64, min_read: u64, value: u64) {
        let next = write.wrapping_add(1);
        debug_assert_within_ring!(next, min_read, self.config.capacity);
        debug_assert_monotonic!("write", write, next);

        self.slot_word(write).store(value, Ordering::Relaxed);
        self.write_word().store(next, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_message_sent();
        }
    }

    /// Rescans every registered cursor and caches the slowest one.
    ///
    /// With no consumers registered there is nothing to observe and the
    /// cached value stays as it is.
    #[cold]
    fn refresh_min_read(&self) -> u64 {
        // Pairs with the fence in `create_consumer`.
        fence(Ordering::SeqCst);

        let count = self.count_word().load(Ordering::Acquire) as usize;
        let cached = self.min_read_word().load(Ordering::Relaxed);
        let fresh = (0..count)
            .map(|index| self.cursor_word(index).load(Ordering::Acquire))
            .min()
            .unwrap_or(cached);

        self.min_read_word().store(fresh, Ordering::Release);

        if self.config.enable_metrics {
            self.metrics.add_min_cursor_refresh();
        }
        tracing::trace!(consumers = count, min_read = fresh, "min read cursor refreshed");

        fresh
    }

    // ---------------------------------------------------------------------
    // REGISTRATION & LIFECYCLE
    // ---------------------------------------------------------------------

    /// Registers a new consumer.
    ///
    /// The consumer starts at the current write position: it receives every
    /// value published after this call returns, and none from before. A
    /// consumer registered before the first send therefore sees the whole
    /// stream.
    ///
    /// Consumers cannot be removed. Dropping a handle freezes its cursor,
    /// which eventually holds the producer back; keep handles alive (and
    /// reading) for as long as the producer runs.
    pub fn create_consumer(&self) -> Result<Consumer<'_, M>, ChannelError> {
        let _guard = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let index = self.count_word().load(Ordering::Relaxed) as usize;
        if index >= self.config.max_consumers {
            tracing::warn!(
                max = self.config.max_consumers,
                "consumer registration rejected, cursor table full"
            );
            return Err(ChannelError::TooManyConsumers {
                max: self.config.max_consumers,
            });
        }

        let cursor = self.cursor_word(index);
        cursor.store(self.write_word().load(Ordering::Acquire), Ordering::Release);
        self.count_word().store(index as u32 + 1, Ordering::Release);

        // Pairs with the fence in `refresh_min_read`.
        fence(Ordering::SeqCst);
        let start = self.write_word().load(Ordering::Acquire);
        cursor.store(start, Ordering::Release);

        tracing::debug!(consumer = index, start, "consumer registered");

        Ok(Consumer::new(self, index, start))
    }

    /// Releases the arena now.
    ///
    /// Equivalent to dropping the channel. The borrow checker refuses this
    /// while any [`Consumer`] is alive, so the arena cannot be used after it
    /// is gone, and ownership means it cannot be released twice.
    pub fn dispose(self) {
        tracing::debug!(
            written = self.write_position(),
            consumers = self.consumer_count(),
            "hyperloop channel disposed"
        );
    }
}

impl<M: MemoryProvider> std::fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("capacity", &self.capacity())
            .field("consumers", &self.consumer_count())
            .field("write_position", &self.write_position())
            .finish_non_exhaustive()
    }
}
