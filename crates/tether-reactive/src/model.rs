#![forbid(unsafe_code)]

//! Observable attribute models.
//!
//! A [`Model`] is a shared handle (`Rc<RefCell<..>>`) over a string-keyed
//! attribute map with an event registry. Mutating it through [`Model::set`]
//! snapshots the whole attribute map into the previous-attributes slot, then
//! fires `"change:<key>"` for every key whose value actually differs,
//! followed by one aggregate `"change"` event.
//!
//! Computed attributes (see [`crate::computed`]) live in a per-instance
//! descriptor table and are wired once, when the model is assembled through
//! [`ModelBuilder`]. Reading a computed name through [`Model::get`] invokes
//! the accessor unless a plain stored attribute shadows it.
//!
//! # Invariants
//!
//! 1. `previous_attributes()` reflects the state immediately prior to the
//!    most recent committed set, even across multiple sets in one
//!    synchronous turn.
//! 2. A set whose values all equal the current values commits the snapshot
//!    but fires nothing.
//! 3. `{silent: true}` suppresses events while still updating state and the
//!    snapshot.
//! 4. All change notifications triggered by a `set` — chain rebinding,
//!    computed recomputation, downstream renders — complete before `set`
//!    returns.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | `get` of an unknown key | `Value::Null` |
//! | `off` of an unknown listener | Silent no-op |
//! | Listener panic | Propagates to the `set`/`trigger` caller |

use ahash::AHashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tether_core::{AnyListener, Emitter, Listener};

use crate::chain::ChainEntry;
use crate::computed::{self, AggregateWiring, ComputedSlot, ComputedSpec};
use crate::event::{Event, SetOptions, change_event};
use crate::next_id;
use crate::value::Value;

/// Shared observable attribute map.
#[derive(Clone)]
pub struct Model {
    pub(crate) inner: Rc<RefCell<ModelInner>>,
}

pub(crate) struct ModelInner {
    pub(crate) id: u64,
    pub(crate) attributes: AHashMap<String, Value>,
    pub(crate) previous: AHashMap<String, Value>,
    pub(crate) emitter: Emitter<Event>,
    pub(crate) computed: AHashMap<String, ComputedSlot>,
    pub(crate) chains: Vec<ChainEntry>,
    pub(crate) aggregates: Vec<AggregateWiring>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    /// Create an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ModelInner {
                id: next_id(),
                attributes: AHashMap::new(),
                previous: AHashMap::new(),
                emitter: Emitter::new(),
                computed: AHashMap::new(),
                chains: Vec::new(),
                aggregates: Vec::new(),
            })),
        }
    }

    /// Create a model pre-populated with attributes. No events fire and the
    /// previous-attributes snapshot stays empty (nothing has been committed).
    #[must_use]
    pub fn with_attrs(attrs: impl IntoIterator<Item = (String, Value)>) -> Self {
        let model = Self::new();
        model.inner.borrow_mut().attributes.extend(attrs);
        model
    }

    /// Start assembling a model with attributes and computed descriptors.
    #[must_use]
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Construction-time identity, unique per process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Read an attribute.
    ///
    /// A plain stored attribute wins over a computed descriptor of the same
    /// name. For computed names: a cached value is returned when the
    /// descriptor is cacheable and warm, otherwise the accessor runs (and
    /// the result is cached when cacheable). Unknown keys read as `Null`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let accessor = {
            let inner = self.inner.borrow();
            if let Some(value) = inner.attributes.get(key) {
                return value.clone();
            }
            match inner.computed.get(key) {
                Some(slot) => {
                    if slot.spec.cacheable {
                        if let Some(cached) = &slot.cached {
                            return cached.clone();
                        }
                    }
                    Some(Rc::clone(&slot.spec.accessor))
                }
                None => None,
            }
        };
        match accessor {
            Some(accessor) => {
                let value = accessor(self);
                let mut inner = self.inner.borrow_mut();
                if let Some(slot) = inner.computed.get_mut(key) {
                    if slot.spec.cacheable {
                        slot.cached = Some(value.clone());
                    }
                }
                value
            }
            None => Value::Null,
        }
    }

    /// Write attributes.
    ///
    /// Snapshots the previous attributes, applies every pair, then (unless
    /// `options.silent`) fires `"change:<key>"` per differing key in input
    /// order and one aggregate `"change"`.
    pub fn set(
        &self,
        attrs: impl IntoIterator<Item = (String, Value)>,
        options: &SetOptions,
    ) -> &Self {
        let attrs: Vec<(String, Value)> = attrs.into_iter().collect();
        if attrs.is_empty() {
            return self;
        }
        let mut changed: Vec<(String, Value)> = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            inner.previous = inner.attributes.clone();
            for (key, value) in attrs {
                if inner.attributes.get(&key) != Some(&value) {
                    changed.push((key.clone(), value.clone()));
                }
                inner.attributes.insert(key, value);
            }
        }
        if !options.silent && !changed.is_empty() {
            for (key, value) in &changed {
                self.trigger(
                    &change_event(key),
                    &Event::Change {
                        target: self.clone(),
                        key: Some(key.clone()),
                        value: value.clone(),
                        options: options.clone(),
                    },
                );
            }
            self.trigger(
                "change",
                &Event::Change {
                    target: self.clone(),
                    key: None,
                    value: Value::Null,
                    options: options.clone(),
                },
            );
        }
        self
    }

    /// Write a single attribute with default options.
    pub fn set_value(&self, key: &str, value: impl Into<Value>) -> &Self {
        self.set([(key.to_owned(), value.into())], &SetOptions::default())
    }

    /// Remove an attribute. A no-op when absent; otherwise snapshots, drops
    /// the key, and fires `"change:<key>"` with `Null` plus the aggregate
    /// `"change"` (unless silent).
    pub fn unset(&self, key: &str, options: &SetOptions) -> &Self {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.attributes.contains_key(key) {
                return self;
            }
            inner.previous = inner.attributes.clone();
            inner.attributes.remove(key);
        }
        if !options.silent {
            self.trigger(
                &change_event(key),
                &Event::Change {
                    target: self.clone(),
                    key: Some(key.to_owned()),
                    value: Value::Null,
                    options: options.clone(),
                },
            );
            self.trigger(
                "change",
                &Event::Change {
                    target: self.clone(),
                    key: None,
                    value: Value::Null,
                    options: options.clone(),
                },
            );
        }
        self
    }

    /// Whether a plain attribute with this key is stored.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.inner.borrow().attributes.contains_key(key)
    }

    /// Whether a computed descriptor with this name is installed.
    #[must_use]
    pub fn has_computed(&self, key: &str) -> bool {
        self.inner.borrow().computed.contains_key(key)
    }

    /// Current plain attribute keys, unordered.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().attributes.keys().cloned().collect()
    }

    /// Clone of the current attribute map.
    #[must_use]
    pub fn attributes(&self) -> HashMap<String, Value> {
        self.inner
            .borrow()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Clone of the previous-attributes snapshot.
    #[must_use]
    pub fn previous_attributes(&self) -> HashMap<String, Value> {
        self.inner
            .borrow()
            .previous
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The value a key held immediately before the most recent committed
    /// set. For a computed name (not shadowed by a plain attribute) this is
    /// the previous computed value captured at its last recomputation.
    #[must_use]
    pub fn previous(&self, key: &str) -> Value {
        let inner = self.inner.borrow();
        if !inner.attributes.contains_key(key) {
            if let Some(slot) = inner.computed.get(key) {
                return slot.previous.clone().unwrap_or_default();
            }
        }
        inner.previous.get(key).cloned().unwrap_or_default()
    }

    /// Register a listener for `event`, after all existing listeners.
    pub fn on(&self, event: &str, listener: Listener<Event>) -> &Self {
        self.inner.borrow_mut().emitter.on(event, listener);
        self
    }

    /// Remove the first registration of `listener` for `event` (by `Rc`
    /// identity). Unknown listeners are a silent no-op.
    pub fn off(&self, event: &str, listener: &Listener<Event>) -> &Self {
        self.inner.borrow_mut().emitter.off(event, listener);
        self
    }

    /// Register a catch-all listener (fires for every event, after named
    /// listeners). Collections use this to surface member events.
    pub fn on_any(&self, listener: AnyListener<Event>) -> &Self {
        self.inner.borrow_mut().emitter.on_any(listener);
        self
    }

    /// Remove a catch-all listener by identity.
    pub fn off_any(&self, listener: &AnyListener<Event>) -> &Self {
        self.inner.borrow_mut().emitter.off_any(listener);
        self
    }

    /// Fire `event` to all matching listeners. The registry is snapshotted
    /// first, so listeners may subscribe and unsubscribe reentrantly.
    pub fn trigger(&self, event: &str, payload: &Event) -> &Self {
        let (named, any) = self.inner.borrow().emitter.snapshot(event);
        for listener in named {
            listener(payload);
        }
        for listener in any {
            listener(event, payload);
        }
        self
    }

    /// Number of named listeners for `event`. Chain-symmetry tests lean on
    /// this.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.borrow().emitter.listener_count(event)
    }

    /// Total named listeners across all events.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.inner.borrow().emitter.total_listeners()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl core::fmt::Debug for Model {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Model")
            .field("id", &inner.id)
            .field("attributes", &inner.attributes.len())
            .field("computed", &inner.computed.len())
            .finish()
    }
}

/// Assembles a model from attributes and computed descriptors, wiring
/// computed dependencies exactly once, at construction.
#[derive(Default)]
pub struct ModelBuilder {
    attrs: Vec<(String, Value)>,
    computed: Vec<ComputedSpec>,
}

impl ModelBuilder {
    /// Add one attribute.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    /// Add many attributes.
    #[must_use]
    pub fn attrs(mut self, attrs: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Add a computed descriptor.
    #[must_use]
    pub fn computed(mut self, spec: ComputedSpec) -> Self {
        self.computed.push(spec);
        self
    }

    /// Build the model: install attributes and descriptors, then wire every
    /// descriptor's dependencies.
    #[must_use]
    pub fn build(self) -> Model {
        let model = Model::new();
        let names: Vec<String> = self.computed.iter().map(|s| s.name.clone()).collect();
        {
            let mut inner = model.inner.borrow_mut();
            inner.attributes.extend(self.attrs);
            for spec in self.computed {
                inner
                    .computed
                    .insert(spec.name.clone(), ComputedSlot::new(spec));
            }
        }
        for name in names {
            computed::wire(&model, &name);
        }
        model
    }
}

impl core::fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("attrs", &self.attrs.len())
            .field("computed", &self.computed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use std::cell::RefCell;

    #[test]
    fn set_and_get() {
        let model = Model::new();
        model.set(attrs! { "name" => "Ada", "age" => 36 }, &SetOptions::default());
        assert_eq!(model.get("name"), Value::from("Ada"));
        assert_eq!(model.get("age"), Value::from(36));
        assert_eq!(model.get("missing"), Value::Null);
    }

    #[test]
    fn change_events_fire_per_differing_key() {
        let model = Model::new();
        model.set(attrs! { "a" => 1 }, &SetOptions::default());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        model.on(
            "change:a",
            Rc::new(move |event| {
                if let Event::Change { value, .. } = event {
                    s.borrow_mut().push(value.clone());
                }
            }),
        );

        // Same value: snapshot commits but nothing fires.
        model.set(attrs! { "a" => 1 }, &SetOptions::default());
        assert!(seen.borrow().is_empty());

        model.set(attrs! { "a" => 2 }, &SetOptions::default());
        assert_eq!(*seen.borrow(), [Value::from(2)]);
    }

    #[test]
    fn aggregate_change_fires_once_per_set() {
        let model = Model::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = Rc::clone(&count);
        model.on("change", Rc::new(move |_| *c.borrow_mut() += 1));

        model.set(attrs! { "a" => 1, "b" => 2 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn silent_set_updates_state_without_events() {
        let model = Model::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = Rc::clone(&count);
        model.on("change:a", Rc::new(move |_| *c.borrow_mut() += 1));

        model.set(attrs! { "a" => 5 }, &SetOptions::silent());
        assert_eq!(*count.borrow(), 0);
        assert_eq!(model.get("a"), Value::from(5));
        // The snapshot committed: "a" was absent before.
        assert_eq!(model.previous("a"), Value::Null);
    }

    #[test]
    fn previous_tracks_most_recent_committed_set() {
        let model = Model::new();
        model.set(attrs! { "x" => 1 }, &SetOptions::default());
        model.set(attrs! { "x" => 2 }, &SetOptions::default());
        assert_eq!(model.previous("x"), Value::from(1));

        // Two sets in one synchronous turn: previous follows the latest.
        model.set(attrs! { "x" => 3 }, &SetOptions::default());
        assert_eq!(model.previous("x"), Value::from(2));
    }

    #[test]
    fn unset_removes_and_notifies() {
        let model = Model::new();
        model.set(attrs! { "a" => 1 }, &SetOptions::default());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        model.on(
            "change:a",
            Rc::new(move |event| {
                if let Event::Change { value, .. } = event {
                    s.borrow_mut().push(value.clone());
                }
            }),
        );

        model.unset("a", &SetOptions::default());
        assert!(!model.has("a"));
        assert_eq!(*seen.borrow(), [Value::Null]);
        assert_eq!(model.previous("a"), Value::from(1));

        // Absent key: silent no-op.
        model.unset("a", &SetOptions::default());
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn off_removes_listener() {
        let model = Model::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = Rc::clone(&count);
        let listener: Listener<Event> = Rc::new(move |_| *c.borrow_mut() += 1);

        model.on("change:a", Rc::clone(&listener));
        model.set(attrs! { "a" => 1 }, &SetOptions::default());
        model.off("change:a", &listener);
        model.set(attrs! { "a" => 2 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn with_attrs_does_not_commit_a_snapshot() {
        let model = Model::with_attrs(attrs! { "a" => 1 });
        assert_eq!(model.get("a"), Value::from(1));
        assert!(model.previous_attributes().is_empty());
    }

    #[test]
    fn listeners_fire_in_registration_order_across_kinds() {
        let model = Model::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        model.on("change:a", Rc::new(move |_| o.borrow_mut().push("first")));
        let o = Rc::clone(&order);
        model.on("change:a", Rc::new(move |_| o.borrow_mut().push("second")));

        model.set(attrs! { "a" => 1 }, &SetOptions::default());
        assert_eq!(*order.borrow(), ["first", "second"]);
    }

    #[test]
    fn nested_model_attribute() {
        let address = Model::with_attrs(attrs! { "city" => "Turin" });
        let customer = Model::with_attrs(attrs! { "address" => address.clone() });
        let fetched = customer.get("address");
        assert_eq!(fetched.as_model().map(Model::id), Some(address.id()));
    }
}
