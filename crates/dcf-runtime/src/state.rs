#![forbid(unsafe_code)]

//! Component state cells.
//!
//! A [`State<T>`] is a shared, version-tracked value. Stateful components
//! capture one in their render closure and the runtime links it to the
//! component's node with [`Runtime::watch`](crate::Runtime::watch), so that
//! every change schedules a re-render for the next tick.
//!
//! # Architecture
//!
//! `State<T>` uses `Rc<RefCell<..>>` and lives on the reconciliation thread.
//! Subscribers are held as `Weak` callbacks and pruned lazily during
//! notification; a [`Subscription`] guard keeps its callback alive.
//!
//! # Invariants
//!
//! 1. The version increments exactly once per mutation that changes the
//!    value.
//! 2. Setting a value equal to the current one is a no-op.
//! 3. Subscribers run in registration order, after the borrow is released,
//!    so they may read the state again.
//! 4. Dropping a [`Subscription`] stops its callback before the next
//!    notification.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type Callback<T> = dyn Fn(&T);

struct Inner<T> {
    value: T,
    version: u64,
    subscribers: Vec<Weak<Callback<T>>>,
}

/// Shared, observable component state.
pub struct State<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("State")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> State<T> {
    /// New state holding `value` at version 0.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Mutation counter.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Replace the value, notifying subscribers if it changed.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Modify the value in place, notifying subscribers if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    /// Register a change callback.
    #[must_use = "dropping the Subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: Rc<Callback<T>> = Rc::new(callback);
        self.inner.borrow_mut().subscribers.push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Live subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn notify(&self) {
        let (value, live) = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            let live: Vec<Rc<Callback<T>>> =
                inner.subscribers.iter().filter_map(Weak::upgrade).collect();
            (inner.value.clone(), live)
        };
        for callback in live {
            callback(&value);
        }
    }
}

/// RAII guard for a [`State`] subscription.
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn equal_set_is_noop() {
        let s = State::new(1);
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let _sub = s.subscribe(move |_| h.set(h.get() + 1));
        s.set(1);
        assert_eq!(s.version(), 0);
        assert_eq!(hits.get(), 0);
        s.set(2);
        assert_eq!(s.version(), 1);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let s = State::new(String::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = s.subscribe(move |_| h.set(h.get() + 1));
        s.update(|v| v.push('a'));
        drop(sub);
        s.update(|v| v.push('b'));
        assert_eq!(hits.get(), 1);
        assert_eq!(s.subscriber_count(), 0);
        assert_eq!(s.get(), "ab");
    }

    #[test]
    fn callbacks_may_read_state() {
        let s = State::new(0);
        let seen = Rc::new(Cell::new(0));
        let (reader, out) = (s.clone(), seen.clone());
        let _sub = s.subscribe(move |_| out.set(reader.get()));
        s.set(42);
        assert_eq!(seen.get(), 42);
        assert_eq!(s.with(|v| *v + 1), 43);
    }
}
