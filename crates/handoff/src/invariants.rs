//! Debug assertion macros for queue and signal invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is zero overhead
//! in release builds. Used by both queue engines and the completion signal.

/// Assert that occupancy never exceeds capacity.
///
/// Checked after every admission-word transition in the MPMC engine.
macro_rules! debug_assert_occupancy_bounded {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            ($count as usize) <= $capacity,
            "occupancy {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that a ring index is within the ring.
///
/// Checked on the head field of the admission word and on the SPSC
/// positions before they are used to address a slot.
macro_rules! debug_assert_index_in_ring {
    ($idx:expr, $capacity:expr) => {
        debug_assert!(
            ($idx as usize) < $capacity,
            "index {} outside ring of {} slots",
            $idx,
            $capacity
        )
    };
}

/// Assert that a waiter count is positive before it is decremented.
///
/// The count is only mutated under the signal lock, so an underflow here
/// means a park/unpark pairing bug, not a data race.
macro_rules! debug_assert_waiter_balanced {
    ($waiters:expr) => {
        debug_assert!($waiters > 0, "waiter count underflow")
    };
}

/// Assert that withdrawing a publication found the just-published pointer.
///
/// A publication that lost the admission race was never admitted, so no
/// consumer can have claimed it and no producer can have overwritten it
/// (slots are only installed over null). The withdraw CAS must therefore
/// find the message it is removing.
macro_rules! debug_assert_unpublish_found_message {
    ($res:expr) => {
        debug_assert!($res.is_ok(), "withdrawn publication already overwritten")
    };
}

pub(crate) use debug_assert_index_in_ring;
pub(crate) use debug_assert_occupancy_bounded;
pub(crate) use debug_assert_unpublish_found_message;
pub(crate) use debug_assert_waiter_balanced;
