#![forbid(unsafe_code)]

//! Owned event hub with a focus registry.
//!
//! A single [`Dispatcher`] instance is created at application startup and
//! threaded to the view tree explicitly — there is no ambient global. Views
//! register their declared event-delegation handlers in `after_render` and
//! unregister in `cleanup`. The dispatcher also tracks the current focus
//! target ("first responder"): focused dispatch routes an event to the
//! focused view's handlers without naming an address.
//!
//! # Invariants
//!
//! 1. Handlers fire in registration order.
//! 2. `unregister_view` removes every handler of that view; a cleaned-up
//!    view can no longer be reached, focused or not.
//! 3. `shutdown()` unregisters everything and drops focus; registration
//!    after shutdown is a silent no-op.

use std::cell::RefCell;
use std::rc::Rc;

/// Event payload delivered to delegated handlers.
#[derive(Clone, Debug)]
pub struct DispatchedEvent {
    /// The event name (e.g. `"click"`).
    pub event: String,
    /// The mount address the event was dispatched at.
    pub address: String,
    /// The selector the matching registration declared.
    pub selector: String,
}

type Handler = Rc<dyn Fn(&DispatchedEvent)>;

struct Registration {
    view: u64,
    address: String,
    event: String,
    selector: String,
    handler: Handler,
}

struct DispatcherInner {
    registrations: Vec<Registration>,
    focus: Option<u64>,
    down: bool,
}

/// Shared event hub handle.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<RefCell<DispatcherInner>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create the hub. One per application, at startup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DispatcherInner {
                registrations: Vec::new(),
                focus: None,
                down: false,
            })),
        }
    }

    /// Register a delegated handler for a view. No-op after shutdown.
    pub fn register(
        &self,
        view: u64,
        address: &str,
        event: &str,
        selector: &str,
        handler: Handler,
    ) {
        let mut inner = self.inner.borrow_mut();
        if inner.down {
            return;
        }
        inner.registrations.push(Registration {
            view,
            address: address.to_owned(),
            event: event.to_owned(),
            selector: selector.to_owned(),
            handler,
        });
    }

    /// Remove every handler registered by `view`; drops focus if it held it.
    pub fn unregister_view(&self, view: u64) {
        let mut inner = self.inner.borrow_mut();
        inner.registrations.retain(|r| r.view != view);
        if inner.focus == Some(view) {
            inner.focus = None;
        }
    }

    /// Dispatch `event` at `address`. Returns how many handlers fired.
    pub fn dispatch(&self, address: &str, event: &str) -> usize {
        let matching: Vec<(String, Handler)> = {
            let inner = self.inner.borrow();
            inner
                .registrations
                .iter()
                .filter(|r| r.address == address && r.event == event)
                .map(|r| (r.selector.clone(), Rc::clone(&r.handler)))
                .collect()
        };
        let fired = matching.len();
        for (selector, handler) in matching {
            handler(&DispatchedEvent {
                event: event.to_owned(),
                address: address.to_owned(),
                selector,
            });
        }
        fired
    }

    /// Dispatch `event` to the focused view's handlers. Returns how many
    /// fired (zero when nothing is focused).
    pub fn dispatch_focused(&self, event: &str) -> usize {
        let matching: Vec<(String, String, Handler)> = {
            let inner = self.inner.borrow();
            let Some(focus) = inner.focus else {
                return 0;
            };
            inner
                .registrations
                .iter()
                .filter(|r| r.view == focus && r.event == event)
                .map(|r| (r.address.clone(), r.selector.clone(), Rc::clone(&r.handler)))
                .collect()
        };
        let fired = matching.len();
        for (address, selector, handler) in matching {
            handler(&DispatchedEvent {
                event: event.to_owned(),
                address,
                selector,
            });
        }
        fired
    }

    /// Make `view` the first responder.
    pub fn set_focus(&self, view: u64) {
        self.inner.borrow_mut().focus = Some(view);
    }

    /// The current first responder, if any.
    #[must_use]
    pub fn current_focus(&self) -> Option<u64> {
        self.inner.borrow().focus
    }

    /// Tear down: unregister all listeners, drop focus, refuse further
    /// registrations.
    pub fn shutdown(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.registrations.clear();
        inner.focus = None;
        inner.down = true;
    }

    /// Number of live registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.inner.borrow().registrations.len()
    }
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Dispatcher")
            .field("registrations", &inner.registrations.len())
            .field("focus", &inner.focus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_handler() -> (Handler, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        (Rc::new(move |_| c.set(c.get() + 1)), count)
    }

    #[test]
    fn dispatch_routes_by_address_and_event() {
        let hub = Dispatcher::new();
        let (handler, count) = counting_handler();
        hub.register(1, "root", "click", ".button", handler);

        assert_eq!(hub.dispatch("root", "click"), 1);
        assert_eq!(hub.dispatch("root", "keydown"), 0);
        assert_eq!(hub.dispatch("other", "click"), 0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let hub = Dispatcher::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Rc::clone(&order);
            hub.register(1, "root", "click", "", Rc::new(move |_| order.borrow_mut().push(tag)));
        }
        hub.dispatch("root", "click");
        assert_eq!(*order.borrow(), ["first", "second"]);
    }

    #[test]
    fn unregister_view_removes_and_drops_focus() {
        let hub = Dispatcher::new();
        let (handler, _) = counting_handler();
        hub.register(7, "root", "click", "", handler);
        hub.set_focus(7);

        hub.unregister_view(7);
        assert_eq!(hub.dispatch("root", "click"), 0);
        assert_eq!(hub.current_focus(), None);
    }

    #[test]
    fn focused_dispatch() {
        let hub = Dispatcher::new();
        let (focused, focused_count) = counting_handler();
        let (other, other_count) = counting_handler();
        hub.register(1, "a", "keydown", "", focused);
        hub.register(2, "b", "keydown", "", other);

        assert_eq!(hub.dispatch_focused("keydown"), 0, "nothing focused yet");
        hub.set_focus(1);
        assert_eq!(hub.dispatch_focused("keydown"), 1);
        assert_eq!((focused_count.get(), other_count.get()), (1, 0));
    }

    #[test]
    fn shutdown_clears_and_refuses() {
        let hub = Dispatcher::new();
        let (handler, _) = counting_handler();
        hub.register(1, "root", "click", "", Rc::clone(&handler));
        hub.set_focus(1);

        hub.shutdown();
        assert_eq!(hub.registration_count(), 0);
        assert_eq!(hub.current_focus(), None);

        hub.register(1, "root", "click", "", handler);
        assert_eq!(hub.registration_count(), 0, "registration after shutdown");
    }
}
