#![forbid(unsafe_code)]

//! Ordered, identity-keyed listener registry.
//!
//! [`Emitter`] is the subscription table behind every observable object in
//! tether. It is payload-generic so the reactive layer can define its own
//! event enum without this crate knowing about models or collections.
//!
//! The emitter deliberately does **not** fire listeners itself. Owners keep
//! it inside a `RefCell`; firing while borrowed would make any listener that
//! subscribes or unsubscribes (chain rebinding does both) panic at runtime.
//! Instead, [`Emitter::snapshot`] hands back owned listener clones and the
//! owner invokes them after releasing the borrow.
//!
//! # Invariants
//!
//! 1. Listeners fire in registration order (per event name; named listeners
//!    before catch-all listeners).
//! 2. `off` removes only the first listener whose `Rc` identity matches, so
//!    a listener registered n times fires n - 1 times after one removal.
//! 3. A snapshot is immune to registry mutation: listeners added during a
//!    fire cycle are not invoked until the next cycle, listeners removed
//!    during the cycle still see the in-flight event.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | `off` with an unknown listener | Silent no-op |
//! | `snapshot` of an unknown event | Empty named list (catch-alls still returned) |

use ahash::AHashMap;
use std::rc::Rc;

/// A listener for a single named event.
pub type Listener<P> = Rc<dyn Fn(&P)>;

/// A catch-all listener; receives the event name alongside the payload.
pub type AnyListener<P> = Rc<dyn Fn(&str, &P)>;

/// Ordered listener registry, generic over the event payload.
pub struct Emitter<P> {
    named: AHashMap<String, Vec<Listener<P>>>,
    any: Vec<AnyListener<P>>,
}

impl<P> Default for Emitter<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Emitter<P> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            named: AHashMap::new(),
            any: Vec::new(),
        }
    }

    /// Register `listener` for `event`, after all existing listeners.
    pub fn on(&mut self, event: &str, listener: Listener<P>) {
        self.named.entry(event.to_owned()).or_default().push(listener);
    }

    /// Remove the first registration of `listener` for `event`, matching by
    /// `Rc` identity. Unknown listeners are a silent no-op.
    pub fn off(&mut self, event: &str, listener: &Listener<P>) {
        if let Some(slot) = self.named.get_mut(event) {
            if let Some(pos) = slot.iter().position(|l| Rc::ptr_eq(l, listener)) {
                slot.remove(pos);
            }
            if slot.is_empty() {
                self.named.remove(event);
            }
        }
    }

    /// Register a catch-all listener; it fires for every event, after the
    /// event's named listeners.
    pub fn on_any(&mut self, listener: AnyListener<P>) {
        self.any.push(listener);
    }

    /// Remove the first registration of a catch-all listener by identity.
    pub fn off_any(&mut self, listener: &AnyListener<P>) {
        if let Some(pos) = self.any.iter().position(|l| Rc::ptr_eq(l, listener)) {
            self.any.remove(pos);
        }
    }

    /// Owned clones of the listeners that should fire for `event`: the named
    /// listeners in registration order, then the catch-alls.
    ///
    /// The caller must drop any borrow of the emitter before invoking them.
    #[must_use]
    pub fn snapshot(&self, event: &str) -> (Vec<Listener<P>>, Vec<AnyListener<P>>) {
        let named = self.named.get(event).cloned().unwrap_or_default();
        (named, self.any.clone())
    }

    /// Number of named listeners currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.named.get(event).map_or(0, Vec::len)
    }

    /// Total named listeners across all events (catch-alls excluded).
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.named.values().map(Vec::len).sum()
    }

    /// Number of catch-all listeners.
    #[must_use]
    pub fn any_listener_count(&self) -> usize {
        self.any.len()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.named.clear();
        self.any.clear();
    }
}

impl<P> core::fmt::Debug for Emitter<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Emitter")
            .field("events", &self.named.len())
            .field("named_listeners", &self.total_listeners())
            .field("any_listeners", &self.any.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn fire(emitter: &Emitter<u32>, event: &str, payload: &u32) {
        let (named, any) = emitter.snapshot(event);
        for l in named {
            l(payload);
        }
        for l in any {
            l(event, payload);
        }
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut emitter: Emitter<u32> = Emitter::new();

        for tag in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            emitter.on("change", Rc::new(move |_| order.borrow_mut().push(tag)));
        }

        fire(&emitter, "change", &0);
        assert_eq!(*order.borrow(), ["first", "second", "third"]);
    }

    #[test]
    fn off_removes_by_identity() {
        let count = Rc::new(RefCell::new(0u32));
        let mut emitter: Emitter<u32> = Emitter::new();

        let c = Rc::clone(&count);
        let listener: Listener<u32> = Rc::new(move |_| *c.borrow_mut() += 1);
        emitter.on("change", Rc::clone(&listener));
        emitter.on("change", Rc::clone(&listener));

        fire(&emitter, "change", &0);
        assert_eq!(*count.borrow(), 2);

        emitter.off("change", &listener);
        fire(&emitter, "change", &0);
        assert_eq!(*count.borrow(), 3, "one of two registrations removed");

        emitter.off("change", &listener);
        fire(&emitter, "change", &0);
        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn off_unknown_listener_is_noop() {
        let mut emitter: Emitter<u32> = Emitter::new();
        let listener: Listener<u32> = Rc::new(|_| {});
        emitter.off("change", &listener);
        emitter.on("change", Rc::new(|_| {}));
        emitter.off("other", &listener);
        assert_eq!(emitter.listener_count("change"), 1);
    }

    #[test]
    fn snapshot_isolates_mutation_during_fire() {
        // A listener that unsubscribes a later listener mid-cycle must not
        // prevent that listener from seeing the in-flight event.
        let emitter = Rc::new(RefCell::new(Emitter::<u32>::new()));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let second_seen = Rc::clone(&seen);
        let second: Listener<u32> = Rc::new(move |v| second_seen.borrow_mut().push(*v));

        let em = Rc::clone(&emitter);
        let second_for_first = Rc::clone(&second);
        let first_seen = Rc::clone(&seen);
        let first: Listener<u32> = Rc::new(move |v| {
            first_seen.borrow_mut().push(*v + 100);
            em.borrow_mut().off("change", &second_for_first);
        });

        emitter.borrow_mut().on("change", first);
        emitter.borrow_mut().on("change", Rc::clone(&second));

        let (named, _) = emitter.borrow().snapshot("change");
        for l in named {
            l(&1);
        }
        assert_eq!(*seen.borrow(), [101, 1], "snapshot still fired second");

        let (named, _) = emitter.borrow().snapshot("change");
        for l in named {
            l(&2);
        }
        assert_eq!(*seen.borrow(), [101, 1, 102], "second gone next cycle");
    }

    #[test]
    fn catch_all_receives_event_name() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter: Emitter<u32> = Emitter::new();

        let s = Rc::clone(&seen);
        emitter.on_any(Rc::new(move |name, v| {
            s.borrow_mut().push(format!("{name}={v}"));
        }));

        fire(&emitter, "add", &1);
        fire(&emitter, "remove", &2);
        assert_eq!(*seen.borrow(), ["add=1", "remove=2"]);
    }

    #[test]
    fn catch_all_fires_after_named() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut emitter: Emitter<u32> = Emitter::new();

        let o = Rc::clone(&order);
        emitter.on_any(Rc::new(move |_, _| o.borrow_mut().push("any")));
        let o = Rc::clone(&order);
        emitter.on("change", Rc::new(move |_| o.borrow_mut().push("named")));

        fire(&emitter, "change", &0);
        assert_eq!(*order.borrow(), ["named", "any"]);
    }

    #[test]
    fn off_any() {
        let count = Rc::new(RefCell::new(0u32));
        let mut emitter: Emitter<u32> = Emitter::new();

        let c = Rc::clone(&count);
        let listener: AnyListener<u32> = Rc::new(move |_, _| *c.borrow_mut() += 1);
        emitter.on_any(Rc::clone(&listener));

        fire(&emitter, "x", &0);
        emitter.off_any(&listener);
        fire(&emitter, "x", &0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn counts_and_clear() {
        let mut emitter: Emitter<u32> = Emitter::new();
        emitter.on("a", Rc::new(|_| {}));
        emitter.on("a", Rc::new(|_| {}));
        emitter.on("b", Rc::new(|_| {}));
        emitter.on_any(Rc::new(|_, _| {}));

        assert_eq!(emitter.listener_count("a"), 2);
        assert_eq!(emitter.listener_count("b"), 1);
        assert_eq!(emitter.listener_count("missing"), 0);
        assert_eq!(emitter.total_listeners(), 3);
        assert_eq!(emitter.any_listener_count(), 1);

        emitter.clear();
        assert_eq!(emitter.total_listeners(), 0);
        assert_eq!(emitter.any_listener_count(), 0);
    }

    #[test]
    fn empty_slot_removed_after_last_off() {
        let mut emitter: Emitter<u32> = Emitter::new();
        let listener: Listener<u32> = Rc::new(|_| {});
        emitter.on("a", Rc::clone(&listener));
        emitter.off("a", &listener);
        assert_eq!(emitter.listener_count("a"), 0);
        assert_eq!(emitter.total_listeners(), 0);
    }
}
