#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! # Basis Integration
//! Low-level plumbing shared by every Basis engine crate: the [`channel::Tx`] abstraction used
//! by `EventLogger`/`ResultsStore`'s background writers, the monotonic [`Sequence`] newtype, and
//! the [`Unrecoverable`]/[`Terminal`] marker traits.

use serde::{Deserialize, Serialize};

/// [`channel::Tx`] abstraction and bounded/unbounded channel helpers.
pub mod channel;

/// Determines if something is considered "unrecoverable" in its current context (eg/ an
/// `EngineError` variant that should propagate as a `SystemFailure`).
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}

/// Communicates that something is terminal and requires shutdown (eg/ the final event in an
/// engine event stream).
pub trait Terminal {
    fn is_terminal(&self) -> bool;
}

/// Monotonically increasing counter, used both for `EngineMeta::sequence` (number of events
/// processed) and as the basis of `EventLogger`'s per-timestamp `order_within_t` assignment.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Deserialize, Serialize,
)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn fetch_add(&mut self) -> u64 {
        let current = self.0;
        self.0 += 1;
        current
    }
}
