//! Handoff - Bounded Pointer-Passing Queues
//!
//! Two bounded queues for moving work between cooperating threads in the
//! same address space. The sender transfers only a
//! [`NonNull`](std::ptr::NonNull) reference to a payload it owns; the
//! receiver processes the payload in place and can
//! notify the sender of completion. Payloads are never copied, and the queue
//! neither allocates nor frees them.
//!
//! - [`Mpmc`]: any number of concurrent senders and receivers, linearized on
//!   a packed admission word with a reserve-then-publish slot protocol.
//! - [`Spsc`]: one sender, one receiver, synchronized on the slots alone.
//!   Same contract, less shared state, faster.
//!
//! Both offer non-blocking (`try_send`/`try_recv`) and blocking
//! (`send`/`recv`) forms. The blocking forms park on internal [`Signal`]s
//! without giving up the lock-free fast path, and [`close`](Mpmc::close)
//! releases every parked thread with [`QueueError::Closed`].
//!
//! Senders that want a completion notification embed a [`Completion`] in
//! their payload, attached to a [`Signal`] they own; the receiver calls
//! [`Completion::complete`] when done.
//!
//! # Example
//!
//! ```
//! use handoff::{Completion, Mpmc, Signal};
//! use std::ptr::NonNull;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! struct Job {
//!     completion: Completion,
//!     input: u64,
//!     output: AtomicU64,
//! }
//!
//! let queue = Mpmc::<Job>::with_capacity(4).unwrap();
//! let done = Arc::new(Signal::new());
//!
//! let job = Job {
//!     completion: Completion::new(Some(Arc::clone(&done))),
//!     input: 21,
//!     output: AtomicU64::new(0),
//! };
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         let msg = queue.recv().unwrap();
//!         // SAFETY: the sender keeps the job alive until the completion
//!         // signal fires, and only touches it again after waiting.
//!         let job = unsafe { msg.as_ref() };
//!         job.output.store(job.input * 2, Ordering::Relaxed);
//!         job.completion.complete();
//!     });
//!
//!     queue.send(NonNull::from(&job)).unwrap();
//!     done.wait();
//! });
//!
//! assert!(job.completion.is_done());
//! assert_eq!(job.output.load(Ordering::Relaxed), 42);
//! ```
//!
//! # Payload lifetime
//!
//! A message reference is on loan from the sender from publication until
//! consumption; the receiver's access ends when it marks the payload
//! processed, after which the sender reclaims it. The queue enforces none of
//! this; it moves pointers. Dereferencing a received pointer is `unsafe`
//! and subject to the contract between sender and receiver.

mod backoff;
pub mod capacity;
mod completion;
mod error;
mod invariants;
mod metrics;
mod mpmc;
mod signal;
mod spsc;

pub use completion::Completion;
pub use error::QueueError;
pub use metrics::MetricsSnapshot;
pub use mpmc::Mpmc;
pub use signal::Signal;
pub use spsc::Spsc;
