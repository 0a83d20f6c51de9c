use crate::invariants::debug_assert_index_in_ring;
use crate::metrics::Metrics;
use crate::{capacity, MetricsSnapshot, QueueError, Signal};
use crossbeam_utils::CachePadded;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use std::thread;

// =============================================================================
// SLOT-HANDOFF PROTOCOL
// =============================================================================
//
// The single-producer / single-consumer engine drops the shared admission
// word: the producer owns `writepos`, the consumer owns `readpos`, and the
// slot itself carries the occupancy information.
//
// **Producer (try_publish):** CAS the slot at `writepos` from null to the
// message. Failure means that slot still holds the oldest unconsumed
// message, meaning the ring is full. On success, publish the advanced `writepos`.
//
// **Consumer (try_consume):** load the slot at `readpos`. Null means empty.
// Otherwise CAS the observed message back to null and publish the advanced
// `readpos`.
//
// Each position has a single writer, so plain stores would do for them; the
// slot CAS is the synchronization point between the two sides. Everything
// stays SeqCst to keep the Dekker handshake with the signal waiter counts
// (see `Signal`) in the single total order.
// =============================================================================

/// Bounded single-producer / single-consumer pointer queue.
///
/// Same contract as [`Mpmc`](crate::Mpmc): senders transfer a `NonNull<T>`
/// to a payload they own and receivers process it in place, but with at most
/// one sender and one receiver active concurrently, which lets the engine
/// synchronize far less shared state.
///
/// The single-caller discipline is a contract, not an enforced property:
/// breaking it can surface as spurious [`QueueError::Full`] or
/// [`QueueError::Empty`] results (every slot transition is still a CAS, so
/// it can never corrupt memory). Parked threads do not count as active, so
/// many blocked senders or receivers waiting on [`close`](Self::close) are
/// fine.
pub struct Spsc<T> {
    /// Next slot to publish into. Written only by the producer.
    writepos: CachePadded<AtomicU32>,
    /// Next slot to consume from. Written only by the consumer.
    readpos: CachePadded<AtomicU32>,
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

impl<T> Spsc<T> {
    /// Creates a queue with at least `capacity` slots.
    ///
    /// Same normalization policy as [`Mpmc`](crate::Mpmc): round up to a
    /// power of two, floor 1, ceiling [`capacity::MAX_CAPACITY`].
    pub fn with_capacity(capacity: usize) -> Result<Self, QueueError> {
        let cap = capacity::normalize(capacity)?;
        let slots = (0..cap).map(|_| AtomicPtr::new(ptr::null_mut())).collect();

        Ok(Self {
            writepos: CachePadded::new(AtomicU32::new(0)),
            readpos: CachePadded::new(AtomicU32::new(0)),
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
    /// A racing snapshot. Equal positions are disambiguated by the slot at
    /// `readpos`: occupied means full, empty means empty.
    pub fn len(&self) -> usize {
        let write = self.writepos.load(Ordering::SeqCst);
        let read = self.readpos.load(Ordering::SeqCst);
        if write == read {
            if self.slots[read as usize].load(Ordering::SeqCst).is_null() {
                0
            } else {
                self.capacity()
            }
        } else {
            (write.wrapping_sub(read) & self.mask) as usize
        }
    }

    /// Returns `true` if no message is currently queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot is occupied.
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
    /// - [`QueueError::Full`] when the slot at the write position is still
    ///   occupied.
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
    /// The returned pointer is on loan from the sender; see
    /// [`Mpmc::try_recv`](crate::Mpmc::try_recv) for the loan semantics.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Closed`] once the queue is closed, even if messages
    ///   remain queued (close does not drain).
    /// - [`QueueError::Empty`] when the slot at the read position is empty.
    pub fn try_recv(&self) -> Result<NonNull<T>, QueueError> {
        self.finish_recv(self.try_consume())
    }

    /// Consumes the oldest message, parking until one is published.
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
    /// Identical protocol to [`Mpmc::close`](crate::Mpmc::close): flag set
    /// under both signal locks (reader lock first), then broadcast until the
    /// waiter counts drain. Does not drain messages. Idempotent.
    pub fn close(&self) {
        {
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
    // Lock-free core, signal-lock free for the blocking overlay (see the
    // matching section in `mpmc.rs`).
    // ---------------------------------------------------------------------

    fn try_publish(&self, msg: NonNull<T>) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let pos = self.writepos.load(Ordering::SeqCst);
        debug_assert_index_in_ring!(pos, self.capacity());
        let slot = &self.slots[pos as usize];

        // An occupied slot at the write position IS the full condition.
        if slot
            .compare_exchange(
                ptr::null_mut(),
                msg.as_ptr(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(QueueError::Full);
        }

        self.writepos
            .store((pos + 1) & self.mask, Ordering::SeqCst);
        self.metrics.add_sent();
        Ok(())
    }

    fn try_consume(&self) -> Result<NonNull<T>, QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let pos = self.readpos.load(Ordering::SeqCst);
        debug_assert_index_in_ring!(pos, self.capacity());
        let slot = &self.slots[pos as usize];

        let observed = slot.load(Ordering::SeqCst);
        let Some(msg) = NonNull::new(observed) else {
            return Err(QueueError::Empty);
        };

        // Lost in the interval only under contract violation; degrade to
        // empty rather than tearing the handoff.
        if slot
            .compare_exchange(observed, ptr::null_mut(), Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(QueueError::Empty);
        }

        self.readpos.store((pos + 1) & self.mask, Ordering::SeqCst);
        self.metrics.add_received();
        Ok(msg)
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

impl<T> Drop for Spsc<T> {
    fn drop(&mut self) {
        // Messages still queued belong to their senders.
        self.close();
    }
}

impl<T> std::fmt::Debug for Spsc<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spsc")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
