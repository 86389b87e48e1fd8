// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error types for ring buffer operations.

use std::collections::TryReserveError;
use thiserror::Error;

/// Errors returned by [`RingBuffer`](crate::realtime::RingBuffer) and its
/// halves.
///
/// Every failing operation leaves the buffer untouched: no bytes move and no
/// position advances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    #[error("Capacity {capacity} is not a positive multiple of 256")]
    InvalidCapacity { capacity: usize },
    #[error("Failed to allocate {capacity} bytes of storage: {source}")]
    Allocation {
        capacity: usize,
        #[source]
        source: TryReserveError,
    },
    #[error("Not enough space: requested {requested} bytes, {available} available")]
    InsufficientSpace { requested: usize, available: usize },
    #[error("Not enough data: requested {requested} bytes, {available} available")]
    InsufficientData { requested: usize, available: usize },
}

impl RingBufferError {
    /// Whether the error is transient backpressure that a later retry may
    /// clear, as opposed to a creation failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientSpace { .. } | Self::InsufficientData { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(RingBufferError::InsufficientSpace {
            requested: 10,
            available: 2
        }
        .is_retryable());
        assert!(!RingBufferError::InvalidCapacity { capacity: 100 }.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = RingBufferError::InsufficientData {
            requested: 8,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Not enough data: requested 8 bytes, 3 available"
        );
    }
}
