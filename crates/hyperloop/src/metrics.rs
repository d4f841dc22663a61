use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Producer-side counters, updated only when `Config::enable_metrics` is set.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: CachePadded<AtomicU64>,
    full_rejections: CachePadded<AtomicU64>,
    min_cursor_refreshes: CachePadded<AtomicU64>,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Values published
    pub messages_sent: u64,
    /// `send` calls that found the ring full
    pub full_rejections: u64,
    /// Rescans of the consumer cursor table
    pub min_cursor_refreshes: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_full_rejection(&self) {
        self.full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_min_cursor_refresh(&self) {
        self.min_cursor_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            full_rejections: self.full_rejections.load(Ordering::Relaxed),
            min_cursor_refreshes: self.min_cursor_refreshes.load(Ordering::Relaxed),
        }
    }
}
