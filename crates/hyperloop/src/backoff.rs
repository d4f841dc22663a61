use std::hint;
use std::thread;

/// Spin-then-yield wait policy for the blocking send/receive variants.
///
/// The first few rounds spin with PAUSE hints (doubling each round); after
/// that every round hands the processor back with `thread::yield_now`. It
/// never parks: a waiter stays runnable so it reacts within one scheduler
/// slice once the other side moves.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Waits one round: spin while cheap, yield afterwards.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..1u32 << self.step {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    /// Returns true once the spin phase is over.
    #[inline]
    pub fn is_yielding(&self) -> bool {
        self.step > Self::SPIN_LIMIT
    }

    /// Reset after progress, so the next wait starts with cheap spins.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
