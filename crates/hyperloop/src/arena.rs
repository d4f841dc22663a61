use crate::layout::PAGE_SIZE;
use crate::{ChannelError, MemoryProvider};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, AtomicU64};

/// A single owned, page-aligned byte region.
///
/// The arena over-allocates by one page, carves a page-aligned base out of
/// the raw block and zeroes the usable part. All access goes through typed
/// atomic views at fixed offsets; the block is handed back to its provider
/// exactly once, on drop.
pub(crate) struct Arena<M: MemoryProvider> {
    provider: M,
    /// Block returned by the provider (what gets freed)
    raw: NonNull<u8>,
    raw_bytes: usize,
    /// First page boundary inside `raw`
    base: NonNull<u8>,
    len: usize,
}

// Safety: the region is only touched through atomics, and the raw pointers
// are owned by this value alone.
unsafe impl<M: MemoryProvider> Send for Arena<M> {}
unsafe impl<M: MemoryProvider> Sync for Arena<M> {}

impl<M: MemoryProvider> Arena<M> {
    /// Allocates `len` usable bytes starting on a page boundary.
    pub(crate) fn new(provider: M, len: usize) -> Result<Self, ChannelError> {
        let raw_bytes = len
            .checked_add(PAGE_SIZE)
            .ok_or(ChannelError::AllocationFailure { bytes: len })?;
        let raw = provider.allocate(raw_bytes)?;

        let addr = raw.as_ptr() as usize;
        let offset = ((addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)) - addr;
        debug_assert!(offset + len <= raw_bytes);

        // SAFETY: offset < PAGE_SIZE, so base and base+len stay inside the
        // raw block of len + PAGE_SIZE bytes.
        let base = unsafe {
            let base = raw.as_ptr().add(offset);
            ptr::write_bytes(base, 0, len);
            NonNull::new_unchecked(base)
        };

        tracing::debug!(raw_bytes, len, offset, "ring arena allocated");

        Ok(Self {
            provider,
            raw,
            raw_bytes,
            base,
            len,
        })
    }

    /// Atomic view of the 8-byte word at `offset`.
    ///
    /// Offsets come from `RingLayout`, which
    /// keeps them aligned and inside `len`; debug builds check it again.
    #[inline]
    pub(crate) fn u64_at(&self, offset: usize) -> &AtomicU64 {
        debug_assert!(
            offset % 8 == 0 && offset + 8 <= self.len,
            "u64 offset {offset} outside arena of {} bytes",
            self.len
        );
        // SAFETY: the layout keeps offsets in bounds and 8-aligned, and base
        // is page aligned. The memory was zero-initialized and lives as long
        // as `self`.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU64>() }
    }

    /// Atomic view of the 4-byte word at `offset`.
    #[inline]
    pub(crate) fn u32_at(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(
            offset % 4 == 0 && offset + 4 <= self.len,
            "u32 offset {offset} outside arena of {} bytes",
            self.len
        );
        // SAFETY: same argument as `u64_at`, with 4-byte alignment.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU32>() }
    }

    /// Address of the page-aligned base.
    #[inline]
    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }
}

impl<M: MemoryProvider> Drop for Arena<M> {
    fn drop(&mut self) {
        // SAFETY: `raw` came from `provider.allocate(raw_bytes)` and drop
        // runs once.
        unsafe { self.provider.free(self.raw, self.raw_bytes) };
        tracing::debug!(raw_bytes = self.raw_bytes, "ring arena released");
    }
}
