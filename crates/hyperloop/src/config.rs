use crate::ChannelError;

/// Default number of slots in the ring.
pub const DEFAULT_CAPACITY: usize = 512;

/// Smallest ring the channel accepts.
pub const MIN_CAPACITY: usize = 8;

/// Default size of the consumer cursor table.
pub const DEFAULT_MAX_CONSUMERS: usize = 28;

/// Configuration for a [`Channel`](crate::Channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of 64-bit slots in the ring (power of two, at least 8)
    pub capacity: usize,
    /// Size of the preallocated consumer cursor table
    pub max_consumers: usize,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    pub const fn new(capacity: usize, max_consumers: usize, enable_metrics: bool) -> Self {
        Self {
            capacity,
            max_consumers,
            enable_metrics,
        }
    }

    /// Sets the ring capacity.
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the size of the consumer cursor table.
    pub const fn with_max_consumers(mut self, max_consumers: usize) -> Self {
        self.max_consumers = max_consumers;
        self
    }

    /// Turns metrics collection on or off.
    pub const fn with_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity - 1
    }

    /// Checks the construction contract.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.capacity < MIN_CAPACITY {
            return Err(ChannelError::ContractViolation {
                reason: "capacity must be at least 8 slots",
            });
        }
        if !self.capacity.is_power_of_two() {
            return Err(ChannelError::ContractViolation {
                reason: "capacity must be a power of two",
            });
        }
        if self.max_consumers == 0 {
            return Err(ChannelError::ContractViolation {
                reason: "max_consumers must be at least 1",
            });
        }
        if u32::try_from(self.max_consumers).is_err() {
            return Err(ChannelError::ContractViolation {
                reason: "max_consumers must fit in a u32",
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_consumers: DEFAULT_MAX_CONSUMERS,
            enable_metrics: false,
        }
    }
}

/// Low latency configuration (4K slots = 32 KiB, fits in L1 cache)
pub const LOW_LATENCY_CONFIG: Config = Config::new(4096, 8, false);

/// High throughput configuration (64K slots, 64 consumers)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(1 << 16, 64, false);
