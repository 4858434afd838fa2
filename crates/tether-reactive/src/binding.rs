#![forbid(unsafe_code)]

//! Two-way attribute bindings.
//!
//! A [`TwoWayBinding`] keeps one attribute of one model equal to one
//! attribute of another. Writing either side propagates to the other; a
//! shared re-entrancy token marks the propagated write in flight so the
//! mirrored subscription skips re-emission instead of oscillating. Each
//! user-visible write therefore produces at most one `"change"` event per
//! side.
//!
//! # Invariants
//!
//! 1. Construction fails (`BindingError::EndpointMissing`) when either
//!    endpoint is absent or its key is empty — surfaced immediately, not
//!    deferred to `connect()`.
//! 2. A binding is created detached; `connect()` subscribes both directions
//!    and aligns `to` with `from`'s current value silently.
//! 3. `disconnect()` releases both subscriptions; dropping the binding
//!    disconnects.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Missing endpoint | `Err(EndpointMissing)` at construction |
//! | `connect()` twice | Second call is a no-op |
//! | Mutual writes from two ordinary listeners | Caller responsibility (unbounded recursion) |

use core::fmt;
use std::cell::Cell;
use std::rc::Rc;

use tether_core::{Listener, Path};

use crate::event::{Event, SetOptions, change_event};
use crate::model::Model;
use crate::value::Value;

/// Construction errors for [`TwoWayBinding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A from/to endpoint (model or key) was not supplied.
    EndpointMissing {
        /// Which side was missing: `"from"` or `"to"`.
        side: &'static str,
    },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndpointMissing { side } => {
                write!(f, "two-way binding requires a '{side}' endpoint")
            }
        }
    }
}

impl std::error::Error for BindingError {}

/// Bidirectional synchronization of two model attributes.
pub struct TwoWayBinding {
    from: Model,
    from_key: String,
    to: Model,
    to_key: String,
    guard: Rc<Cell<bool>>,
    connected: Cell<bool>,
    forward: std::cell::RefCell<Option<Listener<Event>>>,
    backward: std::cell::RefCell<Option<Listener<Event>>>,
}

impl TwoWayBinding {
    /// Create a detached binding between `from.from_key` and `to.to_key`.
    ///
    /// Either endpoint missing (no model, or an empty key) is a fatal
    /// construction error.
    pub fn new(
        from: Option<&Model>,
        from_key: &str,
        to: Option<&Model>,
        to_key: &str,
    ) -> Result<Self, BindingError> {
        let from = from
            .filter(|_| !from_key.is_empty())
            .ok_or(BindingError::EndpointMissing { side: "from" })?;
        let to = to
            .filter(|_| !to_key.is_empty())
            .ok_or(BindingError::EndpointMissing { side: "to" })?;
        Ok(Self {
            from: from.clone(),
            from_key: from_key.to_owned(),
            to: to.clone(),
            to_key: to_key.to_owned(),
            guard: Rc::new(Cell::new(false)),
            connected: Cell::new(false),
            forward: std::cell::RefCell::new(None),
            backward: std::cell::RefCell::new(None),
        })
    }

    /// Subscribe both directions and align `to` with `from`'s current value
    /// (silently — alignment is synchronization, not a user write).
    pub fn connect(&self) -> &Self {
        if self.connected.get() {
            return self;
        }
        self.to.set(
            [(self.to_key.clone(), self.from.get(&self.from_key))],
            &SetOptions::silent(),
        );

        let forward = propagation_listener(&self.to, &self.to_key, &self.guard);
        self.from.on(&change_event(&self.from_key), Rc::clone(&forward));
        *self.forward.borrow_mut() = Some(forward);

        let backward = propagation_listener(&self.from, &self.from_key, &self.guard);
        self.to.on(&change_event(&self.to_key), Rc::clone(&backward));
        *self.backward.borrow_mut() = Some(backward);

        self.connected.set(true);
        self
    }

    /// Release both subscriptions. A detached binding stays detached.
    pub fn disconnect(&self) -> &Self {
        if !self.connected.get() {
            return self;
        }
        if let Some(forward) = self.forward.borrow_mut().take() {
            self.from.off(&change_event(&self.from_key), &forward);
        }
        if let Some(backward) = self.backward.borrow_mut().take() {
            self.to.off(&change_event(&self.to_key), &backward);
        }
        self.connected.set(false);
        self
    }

    /// Whether the binding is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }
}

impl Drop for TwoWayBinding {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for TwoWayBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoWayBinding")
            .field("from", &(self.from.id(), &self.from_key))
            .field("to", &(self.to.id(), &self.to_key))
            .field("connected", &self.connected.get())
            .finish()
    }
}

/// Listener that mirrors a change onto `target.key` unless the shared guard
/// marks the write as an in-flight propagation.
fn propagation_listener(target: &Model, key: &str, guard: &Rc<Cell<bool>>) -> Listener<Event> {
    let target = target.clone();
    let key = key.to_owned();
    let guard = Rc::clone(guard);
    Rc::new(move |event: &Event| {
        if let Event::Change { value, .. } = event {
            if !guard.get() {
                guard.set(true);
                target.set([(key.clone(), value.clone())], &SetOptions::default());
                guard.set(false);
            }
        }
    })
}

impl Model {
    /// Bind this model's `key` to the attribute addressed by `target_path`
    /// (all but the last segment resolve to the partner model), returning
    /// the connected binding.
    ///
    /// Fails with [`BindingError::EndpointMissing`] when the partner does
    /// not resolve to a model.
    pub fn bind_attribute(
        &self,
        key: &str,
        target_path: &Path,
    ) -> Result<TwoWayBinding, BindingError> {
        let (partner, partner_key) = match target_path.len() {
            0 => (None, ""),
            1 => (Some(self.clone()), target_path.last().unwrap_or("")),
            _ => {
                let prefix = Path::from_segments(
                    target_path.segments()[..target_path.len() - 1].to_vec(),
                );
                let partner = match self.resolve(&prefix) {
                    Value::Model(model) => Some(model),
                    _ => None,
                };
                (partner, target_path.last().unwrap_or(""))
            }
        };
        let binding = TwoWayBinding::new(Some(self), key, partner.as_ref(), partner_key)?;
        binding.connect();
        Ok(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use std::cell::RefCell;

    fn event_counter(model: &Model, event: &str) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        model.on(event, Rc::new(move |_| c.set(c.get() + 1)));
        count
    }

    #[test]
    fn endpoint_missing_is_fatal_at_construction() {
        let model = Model::new();
        assert_eq!(
            TwoWayBinding::new(None, "p", Some(&model), "q").unwrap_err(),
            BindingError::EndpointMissing { side: "from" }
        );
        assert_eq!(
            TwoWayBinding::new(Some(&model), "p", None, "q").unwrap_err(),
            BindingError::EndpointMissing { side: "to" }
        );
        assert_eq!(
            TwoWayBinding::new(Some(&model), "", Some(&model), "q").unwrap_err(),
            BindingError::EndpointMissing { side: "from" }
        );
    }

    #[test]
    fn created_detached() {
        let a = Model::new();
        let b = Model::new();
        let binding = TwoWayBinding::new(Some(&a), "p", Some(&b), "q").unwrap();
        assert!(!binding.is_connected());

        a.set(attrs! { "p" => 1 }, &SetOptions::default());
        assert_eq!(b.get("q"), Value::Null, "detached binding propagates nothing");
    }

    #[test]
    fn connect_aligns_silently() {
        let a = Model::with_attrs(attrs! { "p" => 5 });
        let b = Model::new();
        let q_events = event_counter(&b, "change:q");

        let binding = TwoWayBinding::new(Some(&a), "p", Some(&b), "q").unwrap();
        binding.connect();
        assert_eq!(b.get("q"), Value::from(5));
        assert_eq!(q_events.get(), 0, "alignment is silent");
    }

    #[test]
    fn convergence_without_oscillation() {
        let a = Model::new();
        let b = Model::new();
        let binding = TwoWayBinding::new(Some(&a), "p", Some(&b), "q").unwrap();
        binding.connect();

        let p_events = event_counter(&a, "change:p");
        let q_events = event_counter(&b, "change:q");

        a.set(attrs! { "p" => 5 }, &SetOptions::default());
        assert_eq!(a.get("p"), Value::from(5));
        assert_eq!(b.get("q"), Value::from(5));
        assert!(p_events.get() <= 1 && q_events.get() <= 1, "no oscillation");

        b.set(attrs! { "q" => 9 }, &SetOptions::default());
        assert_eq!(a.get("p"), Value::from(9));
        assert_eq!(b.get("q"), Value::from(9));
    }

    #[test]
    fn disconnect_stops_propagation() {
        let a = Model::new();
        let b = Model::new();
        let binding = TwoWayBinding::new(Some(&a), "p", Some(&b), "q").unwrap();
        binding.connect();

        a.set(attrs! { "p" => 1 }, &SetOptions::default());
        assert_eq!(b.get("q"), Value::from(1));

        binding.disconnect();
        assert!(!binding.is_connected());
        a.set(attrs! { "p" => 2 }, &SetOptions::default());
        assert_eq!(b.get("q"), Value::from(1));

        // Listener counts restored.
        assert_eq!(a.listener_count("change:p"), 1); // the test counter only
    }

    #[test]
    fn drop_disconnects() {
        let a = Model::new();
        let b = Model::new();
        {
            let binding = TwoWayBinding::new(Some(&a), "p", Some(&b), "q").unwrap();
            binding.connect();
            a.set(attrs! { "p" => 1 }, &SetOptions::default());
            assert_eq!(b.get("q"), Value::from(1));
        }
        a.set(attrs! { "p" => 2 }, &SetOptions::default());
        assert_eq!(b.get("q"), Value::from(1), "dropped binding is inert");
    }

    #[test]
    fn connect_twice_is_noop() {
        let a = Model::new();
        let b = Model::new();
        let binding = TwoWayBinding::new(Some(&a), "p", Some(&b), "q").unwrap();
        binding.connect();
        binding.connect();
        assert_eq!(a.listener_count("change:p"), 1);
        assert_eq!(b.listener_count("change:q"), 1);
    }

    #[test]
    fn bind_attribute_through_path() {
        let other = Model::new();
        let root = Model::with_attrs(attrs! { "other" => other.clone() });
        let binding = root.bind_attribute("p", &Path::parse("other.q")).unwrap();
        assert!(binding.is_connected());

        let p_events = event_counter(&root, "change:p");
        let q_seen = Rc::new(RefCell::new(Vec::new()));
        let q = Rc::clone(&q_seen);
        other.on(
            "change:q",
            Rc::new(move |event| {
                if let Event::Change { value, .. } = event {
                    q.borrow_mut().push(value.clone());
                }
            }),
        );

        root.set(attrs! { "p" => 5 }, &SetOptions::default());
        assert_eq!(root.get("p"), Value::from(5));
        assert_eq!(other.get("q"), Value::from(5));
        assert!(p_events.get() <= 1);
        assert_eq!(q_seen.borrow().len(), 1);
    }

    #[test]
    fn bind_attribute_unresolvable_partner_is_fatal() {
        let root = Model::new();
        assert!(root.bind_attribute("p", &Path::parse("missing.q")).is_err());
    }
}
