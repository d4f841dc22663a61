//! Byte layout of the ring arena.
//!
//! ```text
//! base (page aligned)
//! +0      line 0   lead padding
//! +128    line 1   write cursor          (producer writes, consumers read)
//! +256    line 2   cached min cursor     (producer only)
//! +384    line 3   consumer count (u32)  (registration writes, producer reads)
//! +512    line 4.. consumer cursors, one line each
//! +H      slot array, H = header rounded up to a page
//! ```
//!
//! Every independently written field gets its own 128-byte line so the
//! adjacent-line prefetcher cannot pull a producer field and a consumer field
//! into the same pair.

use crate::{ChannelError, Config};

/// Spacing between independently written header fields.
pub const CACHE_LINE: usize = 128;

/// Alignment of the arena base and of the slot array.
pub const PAGE_SIZE: usize = 4096;

/// Width of one ring slot.
pub const SLOT_SIZE: usize = std::mem::size_of::<u64>();

const WRITE_CURSOR: usize = CACHE_LINE;
const MIN_READ_CURSOR: usize = 2 * CACHE_LINE;
const CONSUMER_COUNT: usize = 3 * CACHE_LINE;
const CURSOR_TABLE: usize = 4 * CACHE_LINE;

#[inline]
const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Offsets of every field inside a ring arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RingLayout {
    mask: usize,
    max_consumers: usize,
    buffer: usize,
    total: usize,
}

impl RingLayout {
    /// Computes the layout for a validated config.
    pub(crate) fn new(config: &Config) -> Result<Self, ChannelError> {
        let overflow = ChannelError::ContractViolation {
            reason: "ring does not fit in the address space",
        };

        let header_end = config
            .max_consumers
            .checked_mul(CACHE_LINE)
            .and_then(|table| table.checked_add(CURSOR_TABLE))
            .filter(|end| end.checked_add(PAGE_SIZE).is_some())
            .ok_or(overflow)?;
        let buffer = round_up(header_end, PAGE_SIZE);
        let total = config
            .capacity
            .checked_mul(SLOT_SIZE)
            .and_then(|slots| slots.checked_add(buffer))
            .ok_or(overflow)?;

        Ok(Self {
            mask: config.mask(),
            max_consumers: config.max_consumers,
            buffer,
            total,
        })
    }

    #[inline]
    pub(crate) const fn write_cursor(&self) -> usize {
        WRITE_CURSOR
    }

    #[inline]
    pub(crate) const fn min_read_cursor(&self) -> usize {
        MIN_READ_CURSOR
    }

    #[inline]
    pub(crate) const fn consumer_count(&self) -> usize {
        CONSUMER_COUNT
    }

    /// Offset of the cursor line owned by consumer `index`.
    #[inline]
    pub(crate) fn consumer_cursor(&self, index: usize) -> usize {
        debug_assert!(index < self.max_consumers, "consumer index {index} out of table");
        CURSOR_TABLE + index * CACHE_LINE
    }

    /// Offset of the slot holding logical position `position`.
    #[inline]
    pub(crate) fn slot(&self, position: u64) -> usize {
        self.buffer + (position as usize & self.mask) * SLOT_SIZE
    }

    /// Bytes needed past the page-aligned base.
    #[inline]
    pub(crate) const fn total_bytes(&self) -> usize {
        self.total
    }
}
