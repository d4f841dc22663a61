use crate::invariants::{debug_assert_monotonic, debug_assert_published};
use crate::{Backoff, CancelToken, Channel, ChannelError, MemoryProvider, SystemMemory};
use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Read handle for one registered consumer of a [`Channel`].
///
/// Each handle owns a private read cursor and sees the whole stream from its
/// start position onward; consumers do not compete for values. The handle
/// borrows its channel, so it cannot outlive it.
///
/// `Consumer` is `Send` but not `Clone`: one cursor, one reader.
pub struct Consumer<'a, M: MemoryProvider = SystemMemory> {
    channel: &'a Channel<M>,
    index: usize,
    /// Next position to read; mirrored into the shared cursor line
    read: u64,
    /// Last write cursor observed with Acquire
    cached_write: u64,
}

impl<'a, M: MemoryProvider> Consumer<'a, M> {
    pub(crate) fn new(channel: &'a Channel<M>, index: usize, start: u64) -> Self {
        Self {
            channel,
            index,
            read: start,
            cached_write: start,
        }
    }

    /// Returns this consumer's slot in the cursor table.
    #[inline]
    pub fn id(&self) -> usize {
        self.index
    }

    /// Returns the next position this consumer will read.
    #[inline]
    pub fn position(&self) -> u64 {
        self.read
    }

    /// Returns true if a value is waiting.
    #[inline]
    pub fn is_receivable(&self) -> bool {
        self.read != self.channel.write_word().load(Ordering::Acquire)
    }

    /// Returns true if nothing is waiting.
    #[inline]
    pub fn not_receivable(&self) -> bool {
        !self.is_receivable()
    }

    /// Returns how many published values this consumer has not read yet.
    #[inline]
    pub fn pending(&self) -> u64 {
        self.channel
            .write_word()
            .load(Ordering::Acquire)
            .wrapping_sub(self.read)
    }

    /// Returns the write cursor, reloading it only when the cached copy is
    /// used up.
    #[inline]
    fn observe_write(&mut self) -> u64 {
        if self.read == self.cached_write {
            self.cached_write = self.channel.write_word().load(Ordering::Acquire);
        }
        self.cached_write
    }

    /// Reads the slot at `read` and moves past it.
    #[inline]
    fn take(&mut self, write: u64) -> u64 {
        debug_assert_published!(self.read, write);
        let value = self.channel.slot_word(self.read).load(Ordering::Acquire);
        self.advance_to(self.read.wrapping_add(1));
        value
    }

    /// Publishes the new cursor so the producer may reuse the slots behind it.
    #[inline]
    fn advance_to(&mut self, next: u64) {
        debug_assert_monotonic!("read", self.read, next);
        self.read = next;
        self.channel
            .cursor_word(self.index)
            .store(next, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // SINGLE VALUE
    // ---------------------------------------------------------------------

    /// Takes the next value.
    ///
    /// Fails with [`ChannelError::EmptyChannel`] when nothing is waiting;
    /// that is distinct from receiving `Ok(0)`. Pair with
    /// [`is_receivable`](Self::is_receivable) to stay off the error path.
    #[inline]
    pub fn receive(&mut self) -> Result<u64, ChannelError> {
        let write = self.observe_write();
        if self.read == write {
            return Err(ChannelError::EmptyChannel);
        }
        Ok(self.take(write))
    }

    /// Takes the next value, spinning and yielding until one is published.
    pub fn receive_blocking(&mut self) -> u64 {
        match self.receive_waiting(|| Ok::<(), Infallible>(())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`receive_blocking`](Self::receive_blocking), but gives up with
    /// [`ChannelError::Cancelled`] once `token` is cancelled.
    pub fn receive_cancellable(&mut self, token: &CancelToken) -> Result<u64, ChannelError> {
        self.receive_waiting(|| {
            if token.is_cancelled() {
                Err(ChannelError::Cancelled)
            } else {
                Ok(())
            }
        })
    }

    /// Like [`receive_blocking`](Self::receive_blocking), but gives up with
    /// [`ChannelError::Timeout`] after `timeout`.
    pub fn receive_timeout(&mut self, timeout: Duration) -> Result<u64, ChannelError> {
        let deadline = Instant::now() + timeout;
        self.receive_waiting(|| {
            if Instant::now() >= deadline {
                Err(ChannelError::Timeout)
            } else {
                Ok(())
            }
        })
    }

    fn receive_waiting<E>(
        &mut self,
        mut keep_waiting: impl FnMut() -> Result<(), E>,
    ) -> Result<u64, E> {
        let mut backoff = Backoff::new();
        loop {
            let write = self.observe_write();
            if self.read != write {
                return Ok(self.take(write));
            }
            keep_waiting()?;
            backoff.snooze();
        }
    }

    // ---------------------------------------------------------------------
    // BATCH
    // ---------------------------------------------------------------------

    /// Copies up to `out.len()` waiting values into `out`, in order.
    ///
    /// The cursor is published once for the whole batch. Returns the number
    /// of values copied.
    pub fn receive_batch(&mut self, out: &mut [u64]) -> usize {
        let write = self.channel.write_word().load(Ordering::Acquire);
        self.cached_write = write;
        let available = write.wrapping_sub(self.read);
        let n = available.min(out.len() as u64) as usize;
        if n == 0 {
            return 0;
        }

        for (offset, dst) in out[..n].iter_mut().enumerate() {
            let position = self.read.wrapping_add(offset as u64);
            debug_assert_published!(position, write);
            *dst = self.channel.slot_word(position).load(Ordering::Acquire);
        }
        self.advance_to(self.read.wrapping_add(n as u64));
        n
    }

    /// Hands every waiting value to `handler`, in order.
    ///
    /// Only values published before the call are visited; the cursor is
    /// published once at the end. Returns the number of values handled.
    pub fn consume_available<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(u64),
    {
        let write = self.channel.write_word().load(Ordering::Acquire);
        self.cached_write = write;
        let start = self.read;
        let count = write.wrapping_sub(start);
        if count == 0 {
            return 0;
        }

        for position in start..write {
            handler(self.channel.slot_word(position).load(Ordering::Acquire));
        }
        self.advance_to(write);
        count as usize
    }
}

impl<M: MemoryProvider> std::fmt::Debug for Consumer<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("id", &self.index)
            .field("position", &self.read)
            .finish_non_exhaustive()
    }
}
