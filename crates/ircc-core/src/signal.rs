//! Multicast event dispatcher.
//!
//! A [`Signal`] is an ordered list of callbacks. Emitting calls every one of
//! them in registration order with a clone of the arguments.
//!
//! # Return values
//!
//! `Signal<A>` is the notification form. `Signal<A, R>` keeps only the result
//! of the *last* callback; earlier results are discarded. Events whose result
//! matters (the reactor's "polled" event) are expected to carry exactly one
//! callback, or to aggregate inside a single callback.
//!
//! # Reentrancy
//!
//! `emit` takes `&mut self`, so a callback cannot emit the signal it is
//! connected to. Owners that need callbacks to reach the signal (the reactor)
//! detach it with [`std::mem::take`] for the duration of the emit and merge
//! back with [`Signal::append`].

use std::fmt;

/// Ordered list of callbacks taking `A` and returning `R`.
pub struct Signal<A, R = ()> {
    slots: Vec<Box<dyn FnMut(A) -> R>>,
}

impl<A, R> Signal<A, R> {
    /// Create a signal with no callbacks.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Append a callback. There is no removal; callbacks live as long as the
    /// signal.
    pub fn connect(&mut self, slot: impl FnMut(A) -> R + 'static) {
        self.slots.push(Box::new(slot));
    }

    /// Move every callback of `other` to the end of this signal, keeping order.
    pub fn append(&mut self, mut other: Self) {
        self.slots.append(&mut other.slots);
    }

    /// Number of connected callbacks.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if nothing is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<A: Clone, R> Signal<A, R> {
    /// Call every callback in registration order.
    ///
    /// Returns the last callback's result, or `None` if nothing is connected.
    pub fn emit(&mut self, args: A) -> Option<R> {
        let mut last = None;
        for slot in &mut self.slots {
            last = Some(slot(args.clone()));
        }
        last
    }
}

impl<A, R> Default for Signal<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> fmt::Debug for Signal<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("slots", &self.slots.len()).finish()
    }
}
