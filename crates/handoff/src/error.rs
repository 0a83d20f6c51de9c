use thiserror::Error;

/// Error types for queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is full and cannot accept another message right now.
    #[error("queue is full")]
    Full,

    /// The queue holds no message right now.
    #[error("queue is empty")]
    Empty,

    /// The queue has been closed.
    #[error("queue is closed")]
    Closed,

    /// Requested capacity exceeds what the admission counter can represent.
    #[error("requested capacity {requested} exceeds maximum {max}")]
    CapacityExceeded {
        /// The capacity the caller asked for.
        requested: usize,
        /// The largest supported capacity.
        max: usize,
    },
}

impl QueueError {
    /// Returns `true` if this is a transient condition worth retrying
    /// (e.g. `Full` or `Empty` under momentary contention).
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full | Self::Empty)
    }

    /// Returns `true` if this error indicates the queue is permanently unusable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(QueueError::Full.is_recoverable());
        assert!(QueueError::Empty.is_recoverable());
        assert!(!QueueError::Closed.is_recoverable());
        assert!(QueueError::Closed.is_terminal());
        assert!(!QueueError::Full.is_terminal());
    }

    #[test]
    fn test_capacity_error_display() {
        let err = QueueError::CapacityExceeded {
            requested: 1 << 20,
            max: 1 << 15,
        };
        assert_eq!(
            err.to_string(),
            "requested capacity 1048576 exceeds maximum 32768"
        );
    }
}
