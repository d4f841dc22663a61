//! Raw memory providers backing the ring arena.
//!
//! The channel never talks to an allocator directly. It asks a
//! [`MemoryProvider`] for one contiguous byte range at construction and hands
//! it back exactly once on drop.

use crate::ChannelError;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Source of raw byte ranges for a channel arena.
///
/// # Safety contract for `free`
///
/// `free` must be called at most once per address returned by `allocate`, with
/// the same `bytes` that were requested. Freeing twice, or freeing an address
/// that did not come from this provider, is undefined behavior.
pub trait MemoryProvider: Send + Sync {
    /// Returns the base of a region of at least `bytes` bytes, aligned to 8.
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, ChannelError>;

    /// Releases a region previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `base` must come from `self.allocate(bytes)` and must not have been
    /// freed already.
    unsafe fn free(&self, base: NonNull<u8>, bytes: usize);
}

/// Provider backed by the global Rust allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemory;

impl SystemMemory {
    fn layout(bytes: usize) -> Result<Layout, ChannelError> {
        Layout::from_size_align(bytes, std::mem::align_of::<u64>())
            .map_err(|_| ChannelError::AllocationFailure { bytes })
    }
}

impl MemoryProvider for SystemMemory {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, ChannelError> {
        if bytes == 0 {
            return Err(ChannelError::AllocationFailure { bytes });
        }
        let layout = Self::layout(bytes)?;
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(ChannelError::AllocationFailure { bytes })
    }

    unsafe fn free(&self, base: NonNull<u8>, bytes: usize) {
        // The same layout was accepted by `allocate`, so this cannot fail.
        if let Ok(layout) = Self::layout(bytes) {
            // SAFETY: caller guarantees `base` came from `allocate(bytes)`.
            unsafe { alloc::dealloc(base.as_ptr(), layout) };
        }
    }
}

/// Provider backed by anonymous private `mmap` mappings.
///
/// Mappings are page aligned and come straight from the kernel, which keeps
/// large rings out of the process heap.
#[cfg(all(feature = "mmap", unix))]
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapMemory;

#[cfg(all(feature = "mmap", unix))]
impl MemoryProvider for MmapMemory {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, ChannelError> {
        if bytes == 0 {
            return Err(ChannelError::AllocationFailure { bytes });
        }
        // SAFETY: anonymous mapping with no fixed address; no fd involved.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            tracing::warn!(
                bytes,
                error = %std::io::Error::last_os_error(),
                "mmap failed for ring arena"
            );
            return Err(ChannelError::AllocationFailure { bytes });
        }
        NonNull::new(addr.cast::<u8>()).ok_or(ChannelError::AllocationFailure { bytes })
    }

    unsafe fn free(&self, base: NonNull<u8>, bytes: usize) {
        // SAFETY: caller guarantees `base` is a live mapping of `bytes` bytes.
        if unsafe { libc::munmap(base.as_ptr().cast(), bytes) } == -1 {
            tracing::error!(
                bytes,
                error = %std::io::Error::last_os_error(),
                "munmap failed for ring arena"
            );
        }
    }
}
