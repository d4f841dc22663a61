//! Debug assertion macros for the ring cursor invariants.
//!
//! Active only in debug builds (`#[cfg(debug_assertions)]`), so release
//! builds pay nothing.

/// Assert that the producer never runs more than one ring ahead of the
/// slowest consumer it knows about.
///
/// **Invariant**: `write - min_read ≤ capacity`
///
/// Used in: `Channel::publish()` before storing the new write cursor
macro_rules! debug_assert_within_ring {
    ($write:expr, $min_read:expr, $capacity:expr) => {
        debug_assert!(
            $write.wrapping_sub($min_read) <= $capacity as u64,
            "producer at {} is more than {} slots ahead of slowest reader at {}",
            $write,
            $capacity,
            $min_read
        )
    };
}

/// Assert that a consumer does not read past what has been published.
///
/// **Invariant**: `read < write` when a slot is loaded
///
/// Used in: `Consumer::take()` before loading the slot
macro_rules! debug_assert_published {
    ($read:expr, $write:expr) => {
        debug_assert!(
            $read < $write,
            "consumer at {} reading past write cursor {}",
            $read,
            $write
        )
    };
}

/// Assert that a cursor only moves forward.
///
/// **Invariant**: `new ≥ old`
///
/// Used in: `Channel::publish()`, `Consumer::advance_to()`
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "{} cursor moved backwards from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_published;
pub(crate) use debug_assert_within_ring;
