use crate::Signal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Completion marker embedded in a message by the sender.
///
/// The sender allocates this inside its payload (typically as the first
/// field), transmits the payload by reference, and the receiver calls
/// [`complete`](Self::complete) once it has processed the message in place.
/// If a [`Signal`] is attached, the first completion fires it, waking the
/// sender.
///
/// The flag only moves forward: completing twice is a no-op and the signal
/// fires at most once.
#[derive(Debug, Default)]
pub struct Completion {
    signal: Option<Arc<Signal>>,
    done: AtomicBool,
}

impl Completion {
    /// Creates a marker, optionally attached to a signal shared with the
    /// sender.
    pub fn new(signal: Option<Arc<Signal>>) -> Self {
        Self {
            signal,
            done: AtomicBool::new(false),
        }
    }

    /// Returns `true` once the receiver has marked the message processed.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Marks the message processed and fires the attached signal, if any.
    ///
    /// Idempotent: only the transition from unprocessed to processed fires
    /// the signal.
    pub fn complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(signal) = &self.signal {
            signal.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unprocessed() {
        let marker = Completion::new(None);
        assert!(!marker.is_done());
    }

    #[test]
    fn test_complete_without_signal() {
        let marker = Completion::new(None);
        marker.complete();
        assert!(marker.is_done());
    }

    #[test]
    fn test_complete_fires_attached_signal_once() {
        let signal = Arc::new(Signal::new());
        let marker = Completion::new(Some(Arc::clone(&signal)));

        marker.complete();
        marker.complete();
        marker.complete();

        assert!(marker.is_done());
        assert_eq!(signal.count(), 1);
    }

    #[test]
    fn test_shared_signal_counts_each_marker() {
        let signal = Arc::new(Signal::new());
        let markers: Vec<_> = (0..3)
            .map(|_| Completion::new(Some(Arc::clone(&signal))))
            .collect();

        for marker in &markers {
            marker.complete();
        }

        assert_eq!(signal.count(), 3);
    }
}
