//! Error types for hyperloop channel operations.

use thiserror::Error;

/// Errors that can occur while building or using a [`Channel`](crate::Channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Construction parameters break the channel contract
    /// (capacity below 8, capacity not a power of two, no consumer slots).
    #[error("contract violation: {reason}")]
    ContractViolation {
        /// What part of the contract was broken.
        reason: &'static str,
    },

    /// The memory provider could not supply the backing region.
    #[error("failed to allocate {bytes} bytes for the ring arena")]
    AllocationFailure {
        /// Size of the rejected request.
        bytes: usize,
    },

    /// Nothing has been published past the consumer's cursor.
    #[error("nothing to receive")]
    EmptyChannel,

    /// Every consumer cursor slot is already taken.
    #[error("too many consumers registered (max: {max})")]
    TooManyConsumers {
        /// The configured maximum number of consumers.
        max: usize,
    },

    /// A blocking operation observed a cancelled token.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking operation ran past its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl ChannelError {
    /// Returns `true` if retrying the same call later may succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptyChannel | Self::Timeout | Self::Cancelled)
    }

    /// Returns `true` if this error can only come out of channel construction.
    #[inline]
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::ContractViolation { .. } | Self::AllocationFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ChannelError::EmptyChannel.is_recoverable());
        assert!(ChannelError::Timeout.is_recoverable());
        assert!(!ChannelError::TooManyConsumers { max: 4 }.is_recoverable());

        assert!(ChannelError::AllocationFailure { bytes: 64 }.is_construction_error());
        assert!(!ChannelError::EmptyChannel.is_construction_error());
    }

    #[test]
    fn test_error_display() {
        let err = ChannelError::TooManyConsumers { max: 32 };
        assert_eq!(err.to_string(), "too many consumers registered (max: 32)");

        let err = ChannelError::ContractViolation {
            reason: "capacity must be a power of two",
        };
        assert_eq!(
            err.to_string(),
            "contract violation: capacity must be a power of two"
        );
    }
}
