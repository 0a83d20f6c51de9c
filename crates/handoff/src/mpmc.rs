use crate::invariants::{
    debug_assert_index_in_ring, debug_assert_occupancy_bounded,
    debug_assert_unpublish_found_message,
};
use crate::backoff::Backoff;
use crate::metrics::Metrics;
use crate::{capacity, MetricsSnapshot, QueueError, Signal};
use crossbeam_utils::CachePadded;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use std::thread;

// =============================================================================
// RESERVE-THEN-PUBLISH PROTOCOL
// =============================================================================
//
// The multi-producer / multi-consumer engine linearizes every operation on a
// single packed admission word:
//
//     admission = (head:16 | count:16)
//
// `head` indexes the oldest occupied slot, `count` is the number of occupied
// slots. Capacity is a power of two no larger than 1 << 15, so both fields
// fit their half-words and `index & mask` replaces modulo.
//
// **Producer (try_publish):**
// 1. Load the admission word; fail Closed / Full from the observed state.
// 2. Privately acquire slot `(head + count) & mask` with a null -> msg CAS.
//    Failure means the slot still holds a not-yet-consumed message, or
//    another producer got there first; reload and retry.
// 3. Publicly admit the slot with an admission CAS to (head, count + 1).
//    Failure means a concurrent operation moved the word; withdraw the
//    publication (msg -> null CAS) and retry.
//
// **Consumer (try_consume):**
// 1. Load the admission word; fail Closed (closed overrides occupancy) or
//    Empty from the observed state.
// 2. Claim the head slot with an admission CAS to (head + 1, count - 1).
//    Whoever wins the CAS owns the old head slot exclusively.
// 3. Swap the claimed slot back to null and return the message. The swap
//    spins while it reads null: the admitting producer is at most one CAS
//    away.
//
// Acquiring the slot before admitting it is what keeps the word ABA-safe
// with respect to slot contents: no two producers can hold the same slot,
// and a consumer only claims slots whose publication was admitted.
//
// All protocol-critical atomics use SeqCst. The blocking overlay adds a
// Dekker-style handshake between the admission word and the signal waiter
// counts (see `Signal`); both sides of that handshake must be in the single
// total order or a final re-check and a wake decision can miss each other.
// =============================================================================

#[inline]
const fn pack(head: u32, count: u32) -> u32 {
    (head << 16) | count
}

#[inline]
const fn unpack(word: u32) -> (u32, u32) {
    (word >> 16, word & 0xFFFF)
}

/// Bounded multi-producer / multi-consumer pointer queue.
///
/// Senders transfer a `NonNull<T>` to a payload they own; receivers process
/// the payload in place. The queue never copies, allocates, or frees
/// payloads, and a null pointer (the empty-slot sentinel) is unrepresentable
/// in the API.
///
/// Any number of threads may send and receive concurrently. For the
/// single-producer / single-consumer case, [`Spsc`](crate::Spsc) offers the
/// same contract with less synchronization.
///
/// # Example
///
/// ```
/// use handoff::Mpmc;
/// use std::ptr::NonNull;
///
/// let queue = Mpmc::<u64>::with_capacity(8).unwrap();
/// let mut payload = 42u64;
///
/// queue.try_send(NonNull::from(&mut payload)).unwrap();
/// let received = queue.try_recv().unwrap();
/// // SAFETY: `payload` outlives the round-trip and nobody else touches it.
/// assert_eq!(unsafe { *received.as_ptr() }, 42);
/// ```
pub struct Mpmc<T> {
    /// Packed (head | count) admission word - the linearization point.
    admission: CachePadded<AtomicU32>,
    /// Monotonic: once set, never cleared.
    closed: CachePadded<AtomicBool>,
    /// Parked receivers; fired by successful sends.
    readers: CachePadded<Signal>,
    /// Parked senders; fired by successful receives.
    writers: CachePadded<Signal>,
    metrics: Metrics,
    mask: u32,
    slots: Box<[AtomicPtr<T>]>,
}

impl<T> Mpmc<T> {
    /// Creates a queue with at least `capacity` slots.
    ///
    /// The effective capacity is `capacity` rounded up to a power of two
    /// (minimum 1). Requests above [`capacity::MAX_CAPACITY`] fail with
    /// [`QueueError::CapacityExceeded`].
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        let cap = capacity::normalize(capacity)?;
        let slots = (0..cap).map(|_| AtomicPtr::new(ptr::null_mut())).collect();

        Ok(Self {
            admission: CachePadded::new(AtomicU32::new(0)),
            closed: CachePadded::new(AtomicBool::new(false)),
            readers: CachePadded::new(Signal::new()),
            writers: CachePadded::new(Signal::new()),
            metrics: Metrics::new(),
            mask: capacity::mask(cap),
            slots,
        })
    }

    /// Returns the effective (normalized) capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask as usize + 1
    }

    /// Returns the current occupancy.
    ///
    /// A racing snapshot: concurrent operations may change it before the
    /// caller acts on it.
    #[inline]
    pub fn len(&self) -> usize {
        unpack(self.admission.load(Ordering::SeqCst)).1 as usize
    }

    /// Returns `true` if no message is currently admitted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot is currently admitted.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Returns `true` once the queue has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Attempts to publish a message without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Closed`] once the queue is closed.
    /// - [`QueueError::Full`] when every slot is occupied.
    pub fn try_send(&self, msg: NonNull<T>) -> Result<(), QueueError> {
        self.finish_send(self.try_publish(msg))
    }

    /// Publishes a message, parking until a slot frees up.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Closed`] once the queue is closed; a parked sender is
    ///   released with this error by [`close`](Self::close).
    pub fn send(&self, msg: NonNull<T>) -> Result<(), QueueError> {
        match self.try_publish(msg) {
            Err(QueueError::Full) => {}
            done => return self.finish_send(done),
        }

        self.metrics.add_writer_park();
        let done = self.writers.park_until(|| match self.try_publish(msg) {
            Err(QueueError::Full) => None,
            done => Some(done),
        });
        self.finish_send(done)
    }

    /// Attempts to consume the oldest message without blocking.
    ///
    /// The returned pointer is exactly the one a sender published. The
    /// payload it addresses is on loan from that sender: it is valid for the
    /// access the sender's contract allows, until the sender reclaims it
    /// (typically after a [`Completion`](crate::Completion) fires).
    ///
    /// # Errors
    ///
    /// - [`QueueError::Closed`] once the queue is closed, even if messages
    ///   remain admitted (close does not drain).
    /// - [`QueueError::Empty`] when no message is admitted.
    pub fn try_recv(&self) -> Result<NonNull<T>, QueueError> {
        self.finish_recv(self.try_consume())
    }

    /// Consumes the oldest message, parking until one is published.
    ///
    /// See [`try_recv`](Self::try_recv) for the loan semantics of the
    /// returned pointer.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Closed`] once the queue is closed; a parked receiver
    ///   is released with this error by [`close`](Self::close).
    pub fn recv(&self) -> Result<NonNull<T>, QueueError> {
        match self.try_consume() {
            Err(QueueError::Empty) => {}
            done => return self.finish_recv(done),
        }

        self.metrics.add_reader_park();
        let done = self.readers.park_until(|| match self.try_consume() {
            Err(QueueError::Empty) => None,
            done => Some(done),
        });
        self.finish_recv(done)
    }

    /// Closes the queue and releases every parked thread.
    ///
    /// Sets the closed flag under both signal locks, then broadcasts until
    /// no waiter remains parked. Does not drain: messages still admitted
    /// stay in their slots, owned by their senders. Idempotent.
    pub fn close(&self) {
        {
            // Fixed order: reader lock, then writer lock.
            let _readers = self.readers.lock();
            let _writers = self.writers.lock();
            self.closed.store(true, Ordering::SeqCst);
        }

        while self.readers.has_waiters() || self.writers.has_waiters() {
            self.readers.broadcast();
            self.writers.broadcast();
            thread::yield_now();
        }
    }

    /// Returns a snapshot of the queue's operation counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ---------------------------------------------------------------------
    // Lock-free core. These never take a signal lock, so the blocking
    // overlay can re-attempt them while holding one; the advisory wake of
    // the opposite side happens afterwards, outside any lock.
    // ---------------------------------------------------------------------

    fn try_publish(&self, msg: NonNull<T>) -> Result<(), QueueError> {
        let mut backoff = Backoff::new();
        loop {
            let word = self.admission.load(Ordering::SeqCst);
            let (head, count) = unpack(word);

            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            if count as usize >= self.capacity() {
                return Err(QueueError::Full);
            }

            let idx = ((head + count) & self.mask) as usize;
            debug_assert_index_in_ring!(idx, self.capacity());
            let slot = &self.slots[idx];

            // Private acquisition before public admission. A failure means
            // the slot still holds a not-yet-consumed message or another
            // producer owns it; the admission word has moved, reload it.
            if slot
                .compare_exchange(
                    ptr::null_mut(),
                    msg.as_ptr(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
            {
                backoff.spin();
                continue;
            }

            debug_assert_occupancy_bounded!(count + 1, self.capacity());
            if self
                .admission
                .compare_exchange(word, pack(head, count + 1), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.metrics.add_sent();
                return Ok(());
            }

            // Lost the admission race: withdraw the publication. Nobody can
            // have consumed it (it was never admitted) or overwritten it
            // (the slot CAS only installs over null).
            let withdrawn = slot.compare_exchange(
                msg.as_ptr(),
                ptr::null_mut(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            debug_assert_unpublish_found_message!(withdrawn);
            backoff.spin();
        }
    }

    fn try_consume(&self) -> Result<NonNull<T>, QueueError> {
        let mut backoff = Backoff::new();
        loop {
            let word = self.admission.load(Ordering::SeqCst);

            // Closed overrides occupancy: no drain-on-close.
            if self.is_closed() {
                return Err(QueueError::Closed);
            }

            let (head, count) = unpack(word);
            if count == 0 {
                return Err(QueueError::Empty);
            }

            let next = pack((head + 1) & self.mask, count - 1);
            if self
                .admission
                .compare_exchange(word, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                backoff.spin();
                continue;
            }

            // The decrement transferred the old head slot to this thread.
            debug_assert_index_in_ring!(head, self.capacity());
            let slot = &self.slots[head as usize];
            let mut claim = Backoff::new();
            loop {
                let p = slot.swap(ptr::null_mut(), Ordering::SeqCst);
                if let Some(msg) = NonNull::new(p) {
                    self.metrics.add_received();
                    return Ok(msg);
                }
                // Admitted but not yet visible in the slot: the publishing
                // producer is mid-protocol, one step away.
                claim.spin();
            }
        }
    }

    fn finish_send(&self, result: Result<(), QueueError>) -> Result<(), QueueError> {
        if result.is_ok() && self.readers.wake_if_waiting() {
            self.metrics.add_wakeup();
        }
        result
    }

    fn finish_recv(&self, result: Result<NonNull<T>, QueueError>) -> Result<NonNull<T>, QueueError> {
        if result.is_ok() && self.writers.wake_if_waiting() {
            self.metrics.add_wakeup();
        }
        result
    }
}

impl<T> Drop for Mpmc<T> {
    fn drop(&mut self) {
        // Messages still admitted belong to their senders; only the ring and
        // signals are released here.
        self.close();
    }
}

impl<T> std::fmt::Debug for Mpmc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mpmc")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        for (head, count) in [(0, 0), (1, 0), (0x7FFF, 0x8000), (42, 17)] {
            assert_eq!(unpack(pack(head, count)), (head, count));
        }
    }

    #[test]
    fn test_capacity_normalization() {
        assert_eq!(Mpmc::<u64>::with_capacity(0).unwrap().capacity(), 1);
        assert_eq!(Mpmc::<u64>::with_capacity(3).unwrap().capacity(), 4);
        assert_eq!(Mpmc::<u64>::with_capacity(4).unwrap().capacity(), 4);
        assert!(matches!(
            Mpmc::<u64>::with_capacity(capacity::MAX_CAPACITY * 2),
            Err(QueueError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_fill_then_full() {
        let queue = Mpmc::<u64>::with_capacity(4).unwrap();
        let vals: Vec<u64> = (0..5).collect();

        for i in 0..4 {
            queue.try_send(NonNull::from(&vals[i])).unwrap();
        }
        assert!(queue.is_full());
        assert_eq!(queue.len(), 4);
        assert_eq!(
            queue.try_send(NonNull::from(&vals[4])),
            Err(QueueError::Full)
        );
    }

    #[test]
    fn test_fifo_single_thread() {
        let queue = Mpmc::<u64>::with_capacity(8).unwrap();
        let vals: Vec<u64> = (0..8).collect();

        for i in 0..8 {
            queue.try_send(NonNull::from(&vals[i])).unwrap();
        }
        for expected in 0..8u64 {
            let msg = queue.try_recv().unwrap();
            // SAFETY: vals outlives the queue ops and is not mutated.
            assert_eq!(unsafe { *msg.as_ptr() }, expected);
        }
        assert!(queue.is_empty());
        assert_eq!(queue.try_recv(), Err(QueueError::Empty));
    }

    #[test]
    fn test_wraparound_reuses_slots() {
        let queue = Mpmc::<u64>::with_capacity(2).unwrap();
        let vals: Vec<u64> = (0..10).collect();

        for i in 0..10 {
            queue.try_send(NonNull::from(&vals[i])).unwrap();
            let msg = queue.try_recv().unwrap();
            // SAFETY: vals outlives the queue ops and is not mutated.
            assert_eq!(unsafe { *msg.as_ptr() }, i as u64);
        }
    }

    #[test]
    fn test_closed_send_and_recv() {
        let queue = Mpmc::<u64>::with_capacity(4).unwrap();
        let val = 7u64;
        queue.try_send(NonNull::from(&val)).unwrap();

        queue.close();
        assert!(queue.is_closed());

        let other = 8u64;
        assert_eq!(
            queue.try_send(NonNull::from(&other)),
            Err(QueueError::Closed)
        );
        // Closed overrides remaining occupancy.
        assert_eq!(queue.try_recv(), Err(QueueError::Closed));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = Mpmc::<u64>::with_capacity(4).unwrap();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }

    #[test]
    fn test_metrics_track_operations() {
        let queue = Mpmc::<u64>::with_capacity(4).unwrap();
        let vals: Vec<u64> = (0..3).collect();

        for i in 0..3 {
            queue.try_send(NonNull::from(&vals[i])).unwrap();
        }
        queue.try_recv().unwrap();

        let snap = queue.metrics();
        assert_eq!(snap.messages_sent, 3);
        assert_eq!(snap.messages_received, 1);
    }
}
