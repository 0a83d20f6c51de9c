use std::sync::atomic::{AtomicU64, Ordering};

/// Per-queue operation counters.
///
/// Counters are updated with relaxed increments on the hot paths; a snapshot
/// is a plain copy and may be mid-flight with respect to concurrent
/// operations.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    writer_parks: AtomicU64,
    reader_parks: AtomicU64,
    wakeups: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_writer_park(&self) {
        self.writer_parks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_reader_park(&self) {
        self.reader_parks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            writer_parks: self.writer_parks.load(Ordering::Relaxed),
            reader_parks: self.reader_parks.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a queue's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages successfully published.
    pub messages_sent: u64,
    /// Messages successfully consumed.
    pub messages_received: u64,
    /// Times a blocking sender parked on the writer signal.
    pub writer_parks: u64,
    /// Times a blocking receiver parked on the reader signal.
    pub reader_parks: u64,
    /// Advisory wakeups delivered to the opposite side.
    pub wakeups: u64,
}
