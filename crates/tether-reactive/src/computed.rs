#![forbid(unsafe_code)]

//! Computed attributes: derived values with declared dependencies.
//!
//! A [`ComputedSpec`] is a first-class descriptor record — name, accessor,
//! dependency list, cacheable flag — installed into a model's per-instance
//! descriptor table by [`crate::ModelBuilder`]. Dependencies are wired once,
//! at construction, and live as long as the owner.
//!
//! A dependency is either a plain attribute name (recompute on
//! `"change:<name>"`) or a collection aggregate: `"<attr>.every-item"`
//! recomputes on the referenced collection's membership events, and
//! `"<attr>.every-item.<property>"` additionally on member property changes
//! surfaced at the collection level. The engine also watches the collection
//! attribute itself, so a late-arriving or replaced collection re-wires the
//! aggregate subscriptions — an unresolvable dependency never errors, it
//! simply does not fire until it becomes resolvable.
//!
//! On any dependency firing, the engine captures the previous computed value
//! by evaluating the accessor against the owner's previous-attributes
//! snapshot, invalidates the cache, computes the new value (caching it when
//! cacheable), and emits a synthetic `"change:<name>"` on the owner.
//!
//! # Invariants
//!
//! 1. A cacheable computed attribute evaluates its accessor at most once per
//!    dependency change cycle.
//! 2. After a dependency change, `Model::previous(name)` returns the value
//!    `get(name)` would have returned immediately before the change.
//! 3. A plain stored attribute of the same name shadows the descriptor on
//!    the read path.

use std::rc::{Rc, Weak};

use tether_core::Listener;

use crate::collection::Collection;
use crate::event::{Event, SetOptions, change_event};
use crate::model::{Model, ModelInner};
use crate::value::Value;

/// Accessor function of a computed attribute.
pub type Accessor = Rc<dyn Fn(&Model) -> Value>;

/// One declared dependency of a computed attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dependency {
    /// Recompute when this attribute of the owner changes.
    Attribute(String),
    /// Recompute on membership or member-property changes of the collection
    /// stored in the owner's `collection` attribute.
    EveryItem {
        /// Owner attribute holding the collection.
        collection: String,
        /// Member property to watch; `None` watches membership only.
        property: Option<String>,
    },
}

impl Dependency {
    /// Parse a dependency spec string.
    ///
    /// `"total"` is a plain attribute dependency; `"items.every-item"` and
    /// `"items.every-item.done"` are collection aggregates.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(".every-item") {
            Some((collection, rest))
                if !collection.is_empty() && (rest.is_empty() || rest.starts_with('.')) =>
            {
                let property = rest
                    .strip_prefix('.')
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned);
                Self::EveryItem {
                    collection: collection.to_owned(),
                    property,
                }
            }
            _ => Self::Attribute(spec.to_owned()),
        }
    }
}

/// Descriptor for one computed attribute.
#[derive(Clone)]
pub struct ComputedSpec {
    /// Attribute name the descriptor answers for.
    pub name: String,
    /// Ordered dependency list.
    pub dependencies: Vec<Dependency>,
    /// Whether the engine may cache the computed value between changes.
    pub cacheable: bool,
    /// The accessor.
    pub accessor: Accessor,
}

impl ComputedSpec {
    /// Create a descriptor with no dependencies and caching off.
    #[must_use]
    pub fn new(name: impl Into<String>, accessor: impl Fn(&Model) -> Value + 'static) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            cacheable: false,
            accessor: Rc::new(accessor),
        }
    }

    /// Add one dependency, parsed from its spec string.
    #[must_use]
    pub fn dependency(mut self, spec: &str) -> Self {
        self.dependencies.push(Dependency::parse(spec));
        self
    }

    /// Add many dependencies, parsed from spec strings.
    #[must_use]
    pub fn dependencies<'a>(mut self, specs: impl IntoIterator<Item = &'a str>) -> Self {
        self.dependencies
            .extend(specs.into_iter().map(Dependency::parse));
        self
    }

    /// Enable or disable value caching.
    #[must_use]
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }
}

impl core::fmt::Debug for ComputedSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputedSpec")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

/// Runtime state of one installed descriptor.
pub(crate) struct ComputedSlot {
    pub(crate) spec: ComputedSpec,
    pub(crate) cached: Option<Value>,
    pub(crate) previous: Option<Value>,
}

impl ComputedSlot {
    pub(crate) fn new(spec: ComputedSpec) -> Self {
        Self {
            spec,
            cached: None,
            previous: None,
        }
    }
}

/// Live aggregate subscriptions of one descriptor against one collection.
pub(crate) struct AggregateWiring {
    pub(crate) name: String,
    pub(crate) collection_key: String,
    pub(crate) collection: Collection,
    pub(crate) subs: Vec<(String, Listener<Event>)>,
}

/// Wire the named descriptor's dependencies. Called once per descriptor by
/// the model builder.
pub(crate) fn wire(owner: &Model, name: &str) {
    let dependencies = match owner.inner.borrow().computed.get(name) {
        Some(slot) => slot.spec.dependencies.clone(),
        None => return,
    };
    for dependency in dependencies {
        match dependency {
            Dependency::Attribute(attr) => {
                owner.on(&change_event(&attr), recompute_listener(owner, name));
            }
            Dependency::EveryItem {
                collection,
                property,
            } => {
                wire_aggregate(owner, name, &collection, property.as_deref());
                owner.on(
                    &change_event(&collection),
                    rewire_listener(owner, name, &collection, property),
                );
            }
        }
    }
}

/// Listener that recomputes `name` on the owning model.
fn recompute_listener(owner: &Model, name: &str) -> Listener<Event> {
    let weak: Weak<_> = Rc::downgrade(&owner.inner);
    let name = name.to_owned();
    Rc::new(move |event: &Event| {
        if let Some(inner) = weak.upgrade() {
            let owner = Model { inner };
            recompute(&owner, &name, event.options());
        }
    })
}

/// Listener that re-wires aggregate subscriptions when the collection
/// attribute itself is replaced, then recomputes.
fn rewire_listener(
    owner: &Model,
    name: &str,
    collection_key: &str,
    property: Option<String>,
) -> Listener<Event> {
    let weak: Weak<std::cell::RefCell<ModelInner>> = Rc::downgrade(&owner.inner);
    let name = name.to_owned();
    let collection_key = collection_key.to_owned();
    Rc::new(move |event: &Event| {
        if let Some(inner) = weak.upgrade() {
            let owner = Model { inner };
            unwire_aggregate(&owner, &name, &collection_key);
            wire_aggregate(&owner, &name, &collection_key, property.as_deref());
            recompute(&owner, &name, event.options());
        }
    })
}

/// Subscribe the descriptor to the collection currently stored under
/// `collection_key`. Does nothing while the attribute is not a collection —
/// the rewire listener retries when it changes.
fn wire_aggregate(owner: &Model, name: &str, collection_key: &str, property: Option<&str>) {
    let Value::Collection(collection) = owner.get(collection_key) else {
        return;
    };
    let mut events = vec!["add".to_owned(), "remove".to_owned(), "refresh".to_owned()];
    if let Some(property) = property {
        events.push(change_event(property));
    }
    let mut subs = Vec::with_capacity(events.len());
    for event in events {
        let listener = recompute_listener(owner, name);
        collection.on(&event, Rc::clone(&listener));
        subs.push((event, listener));
    }
    owner.inner.borrow_mut().aggregates.push(AggregateWiring {
        name: name.to_owned(),
        collection_key: collection_key.to_owned(),
        collection,
        subs,
    });
}

/// Drop the descriptor's subscriptions against whatever collection it was
/// wired to under `collection_key`.
fn unwire_aggregate(owner: &Model, name: &str, collection_key: &str) {
    let removed: Vec<AggregateWiring> = {
        let mut inner = owner.inner.borrow_mut();
        let mut removed = Vec::new();
        let mut index = 0;
        while index < inner.aggregates.len() {
            if inner.aggregates[index].name == name
                && inner.aggregates[index].collection_key == collection_key
            {
                removed.push(inner.aggregates.remove(index));
            } else {
                index += 1;
            }
        }
        removed
    };
    for wiring in removed {
        for (event, listener) in &wiring.subs {
            wiring.collection.off(event, listener);
        }
    }
}

/// Recompute one descriptor: capture the previous value against the
/// previous-attributes snapshot, invalidate the cache, compute fresh, and
/// emit the synthetic change event.
pub(crate) fn recompute(owner: &Model, name: &str, options: &SetOptions) {
    let Some((accessor, cacheable)) = owner
        .inner
        .borrow()
        .computed
        .get(name)
        .map(|slot| (Rc::clone(&slot.spec.accessor), slot.spec.cacheable))
    else {
        return;
    };
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("recompute", owner = owner.id(), attribute = name).entered();

    // Evaluate "the value before this change" by substituting the previous
    // snapshot for the live attributes around the accessor call.
    let saved = {
        let mut inner = owner.inner.borrow_mut();
        let current = inner.attributes.clone();
        inner.attributes = inner.previous.clone();
        current
    };
    let previous_value = (accessor)(owner);
    {
        let mut inner = owner.inner.borrow_mut();
        inner.attributes = saved;
        if let Some(slot) = inner.computed.get_mut(name) {
            slot.previous = Some(previous_value);
            slot.cached = None;
        }
    }

    let new_value = (accessor)(owner);
    if cacheable {
        if let Some(slot) = owner.inner.borrow_mut().computed.get_mut(name) {
            slot.cached = Some(new_value.clone());
        }
    }
    owner.trigger(
        &change_event(name),
        &Event::Change {
            target: owner.clone(),
            key: Some(name.to_owned()),
            value: new_value,
            options: options.clone(),
        },
    );
}
