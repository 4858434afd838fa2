#![forbid(unsafe_code)]

//! Path resolution and chained change subscriptions.
//!
//! [`resolve`] walks a dotted path through the object graph, invoking
//! computed accessors transparently. [`Model::bind_path`] subscribes a
//! callback along every hop of the path so that a change anywhere in the
//! chain reaches it — and, when an intermediate link changes identity, the
//! suffix subscriptions migrate from the old sub-object to its replacement
//! before the callback runs.
//!
//! Each hop's subscription is a generated wrapper recorded in a side
//! registry on the hop's model, keyed by (original callback identity, event
//! name, remaining suffix). [`Model::unbind_path`] mirrors the walk and
//! removes exactly those wrappers; it never unsubscribes the raw callback
//! unless no wrapper was ever registered for that hop.
//!
//! # Invariants
//!
//! 1. One wrapper per (anchor, callback, suffix) per bind call; bind followed
//!    by unbind restores every listener count along the path.
//! 2. Rebinding is atomic with respect to the triggering change: the old
//!    suffix subtree is fully unsubscribed and the new one subscribed before
//!    the original callback observes the change.
//! 3. A hop that is not a model stops the walk; binding through an absent
//!    segment subscribes the reachable prefix and is otherwise silent.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Path unresolvable at bind time | Prefix bound, rest silently skipped |
//! | Unbind of a never-bound path | Silent no-op |
//! | Mid-path scalar | Resolution reports `Null` from there on |

use std::rc::Rc;

use tether_core::{Listener, Path};

use crate::event::{Event, change_event};
use crate::model::Model;
use crate::value::Value;

/// One registered chain wrapper, stored on the model it is subscribed to.
pub(crate) struct ChainEntry {
    pub(crate) original: Listener<Event>,
    pub(crate) event: String,
    pub(crate) suffix: Path,
    pub(crate) wrapper: Listener<Event>,
}

/// Resolve `path` against `root`, returning the terminal value.
///
/// Computed accessors along the way are invoked; a missing or scalar
/// intermediate link makes the remainder resolve to `Null`. No error is
/// raised — paths into not-yet-loaded data resolve to "nothing bound yet".
#[must_use]
pub fn resolve(path: &Path, root: &Value) -> Value {
    if path.is_empty() {
        return root.clone();
    }
    let chain = resolve_chain(path, root);
    if chain.len() == path.len() + 1 {
        chain.last().cloned().unwrap_or_default()
    } else {
        Value::Null
    }
}

/// Resolve `path` against `root`, returning every value visited in order:
/// the root, each intermediate link, and the terminal value. The walk stops
/// early at the first link that cannot be traversed further.
#[must_use]
pub fn resolve_chain(path: &Path, root: &Value) -> Vec<Value> {
    let mut chain = vec![root.clone()];
    let mut current = root.clone();
    for segment in path.segments() {
        let next = match &current {
            Value::Model(model) => model.get(segment),
            Value::Collection(collection) => collection.attribute(segment),
            _ => return chain,
        };
        chain.push(next.clone());
        if next.is_null() {
            return chain;
        }
        current = next;
    }
    chain
}

impl Model {
    /// Resolve `path` with this model as the root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Value {
        resolve(path, &Value::Model(self.clone()))
    }

    /// Resolve `path` with this model as the root, reporting every value
    /// visited.
    #[must_use]
    pub fn resolve_chain(&self, path: &Path) -> Vec<Value> {
        resolve_chain(path, &Value::Model(self.clone()))
    }

    /// Subscribe `callback` to changes anywhere along `path`.
    ///
    /// For each resolvable hop `(object, segment)` a wrapper is subscribed
    /// on `"change:<segment>"`. When an intermediate hop's value is
    /// replaced, the wrapper unbinds the remaining suffix from the old value
    /// and binds it on the new one, then invokes `callback`. An empty or
    /// fully unresolvable path is a silent no-op.
    pub fn bind_path(&self, path: &Path, callback: &Listener<Event>) -> &Self {
        if path.is_empty() {
            return self;
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("bind_path", root = self.id(), path = %path).entered();

        let chain = self.resolve_chain(path);
        for (index, segment) in path.segments().iter().enumerate() {
            let Some(Value::Model(hop)) = chain.get(index) else {
                break;
            };
            let suffix = path.suffix_from(index + 1);
            let event = change_event(segment);
            let wrapper = make_wrapper(suffix.clone(), Rc::clone(callback));
            let mut inner = hop.inner.borrow_mut();
            inner.chains.push(ChainEntry {
                original: Rc::clone(callback),
                event: event.clone(),
                suffix,
                wrapper: Rc::clone(&wrapper),
            });
            inner.emitter.on(&event, wrapper);
        }
        self
    }

    /// Remove the subscriptions registered by a matching [`bind_path`] call.
    ///
    /// Mirrors the walk and removes the registered wrapper per hop, falling
    /// back to the raw callback when no wrapper was recorded (a hop that was
    /// absent at bind time). Unbinding a never-bound path is silent.
    ///
    /// [`bind_path`]: Model::bind_path
    pub fn unbind_path(&self, path: &Path, callback: &Listener<Event>) -> &Self {
        if path.is_empty() {
            return self;
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("unbind_path", root = self.id(), path = %path).entered();

        let chain = self.resolve_chain(path);
        for (index, segment) in path.segments().iter().enumerate() {
            let Some(Value::Model(hop)) = chain.get(index) else {
                break;
            };
            let suffix = path.suffix_from(index + 1);
            let event = change_event(segment);
            let mut inner = hop.inner.borrow_mut();
            let found = inner.chains.iter().position(|entry| {
                Rc::ptr_eq(&entry.original, callback)
                    && entry.event == event
                    && entry.suffix == suffix
            });
            match found {
                Some(position) => {
                    let entry = inner.chains.remove(position);
                    inner.emitter.off(&event, &entry.wrapper);
                }
                None => inner.emitter.off(&event, callback),
            }
        }
        self
    }
}

/// Wrapper subscribed at one hop: migrate the suffix subscriptions when the
/// hop's value changes identity, then invoke the original callback.
fn make_wrapper(suffix: Path, original: Listener<Event>) -> Listener<Event> {
    Rc::new(move |event| {
        if let Event::Change {
            target, key, value, ..
        } = event
        {
            if !suffix.is_empty() {
                if let Some(key) = key {
                    if let Value::Model(old) = target.previous(key) {
                        old.unbind_path(&suffix, &original);
                    }
                }
                if let Value::Model(new) = value {
                    new.bind_path(&suffix, &original);
                }
            }
            original(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::event::SetOptions;
    use std::cell::RefCell;

    fn graph() -> (Model, Model, Model) {
        // root -> a -> b, with "b.value" a scalar leaf.
        let b = Model::with_attrs(attrs! { "value" => 1 });
        let a = Model::with_attrs(attrs! { "b" => b.clone() });
        let root = Model::with_attrs(attrs! { "a" => a.clone() });
        (root, a, b)
    }

    fn counting_callback() -> (Listener<Event>, Rc<RefCell<u32>>) {
        let count = Rc::new(RefCell::new(0u32));
        let c = Rc::clone(&count);
        (Rc::new(move |_| *c.borrow_mut() += 1), count)
    }

    #[test]
    fn resolve_terminal_value() {
        let (root, _, _) = graph();
        assert_eq!(root.resolve(&Path::parse("a.b.value")), Value::from(1));
    }

    #[test]
    fn resolve_chain_includes_root_and_terminal() {
        let (root, a, b) = graph();
        let chain = root.resolve_chain(&Path::parse("a.b.value"));
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0].as_model().map(Model::id), Some(root.id()));
        assert_eq!(chain[1].as_model().map(Model::id), Some(a.id()));
        assert_eq!(chain[2].as_model().map(Model::id), Some(b.id()));
        assert_eq!(chain[3], Value::from(1));
    }

    #[test]
    fn resolve_missing_link_reports_null() {
        let (root, _, _) = graph();
        assert_eq!(root.resolve(&Path::parse("a.missing.value")), Value::Null);
        assert_eq!(root.resolve(&Path::parse("nope.b.value")), Value::Null);
        // The partial chain stops at the null link.
        let chain = root.resolve_chain(&Path::parse("nope.b.value"));
        assert_eq!(chain.len(), 2);
        assert!(chain[1].is_null());
    }

    #[test]
    fn resolve_through_scalar_stops() {
        let (root, _, _) = graph();
        assert_eq!(root.resolve(&Path::parse("a.b.value.deeper")), Value::Null);
    }

    #[test]
    fn bound_callback_fires_on_leaf_change() {
        let (root, _, b) = graph();
        let (callback, count) = counting_callback();
        root.bind_path(&Path::parse("a.b.value"), &callback);

        b.set(attrs! { "value" => 2 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn bound_callback_fires_on_intermediate_change() {
        let (root, a, _) = graph();
        let (callback, count) = counting_callback();
        root.bind_path(&Path::parse("a.b.value"), &callback);

        let b2 = Model::with_attrs(attrs! { "value" => 10 });
        a.set(attrs! { "b" => b2 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn chain_symmetry() {
        let (root, a, b) = graph();
        let path = Path::parse("a.b.value");
        let before = (
            root.listener_count("change:a"),
            a.listener_count("change:b"),
            b.listener_count("change:value"),
        );

        let (callback, _) = counting_callback();
        root.bind_path(&path, &callback);
        assert_eq!(root.listener_count("change:a"), before.0 + 1);
        assert_eq!(a.listener_count("change:b"), before.1 + 1);
        assert_eq!(b.listener_count("change:value"), before.2 + 1);

        root.unbind_path(&path, &callback);
        assert_eq!(root.listener_count("change:a"), before.0);
        assert_eq!(a.listener_count("change:b"), before.1);
        assert_eq!(b.listener_count("change:value"), before.2);
    }

    #[test]
    fn dynamic_rebinding_migrates_suffix() {
        let (root, _, b) = graph();
        let (callback, count) = counting_callback();
        root.bind_path(&Path::parse("a.b.value"), &callback);

        // Replace root.a wholesale.
        let b2 = Model::with_attrs(attrs! { "value" => 100 });
        let a2 = Model::with_attrs(attrs! { "b" => b2.clone() });
        root.set(attrs! { "a" => a2 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 1, "replacement itself fires once");

        // New subtree is live.
        b2.set(attrs! { "value" => 101 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 2);

        // Discarded subtree is dead.
        b.set(attrs! { "value" => -1 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 2, "old subtree must not fire");
        assert_eq!(b.listener_count("change:value"), 0);
    }

    #[test]
    fn rebinding_then_unbind_releases_migrated_chain() {
        let (root, _, _) = graph();
        let path = Path::parse("a.b.value");
        let (callback, _) = counting_callback();
        root.bind_path(&path, &callback);

        let b2 = Model::with_attrs(attrs! { "value" => 0 });
        let a2 = Model::with_attrs(attrs! { "b" => b2.clone() });
        root.set(attrs! { "a" => a2.clone() }, &SetOptions::default());

        root.unbind_path(&path, &callback);
        assert_eq!(root.listener_count("change:a"), 0);
        assert_eq!(a2.listener_count("change:b"), 0);
        assert_eq!(b2.listener_count("change:value"), 0);
    }

    #[test]
    fn binding_absent_segment_binds_reachable_prefix() {
        let root = Model::new();
        let path = Path::parse("a.b");
        let (callback, count) = counting_callback();
        root.bind_path(&path, &callback);
        assert_eq!(root.listener_count("change:a"), 1);

        // When the missing link appears, the suffix binds to it.
        let b_holder = Model::with_attrs(attrs! { "b" => 5 });
        root.set(attrs! { "a" => b_holder.clone() }, &SetOptions::default());
        assert_eq!(*count.borrow(), 1);
        assert_eq!(b_holder.listener_count("change:b"), 1);

        b_holder.set(attrs! { "b" => 6 }, &SetOptions::default());
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn unbind_never_bound_is_silent() {
        let (root, a, b) = graph();
        let (callback, _) = counting_callback();
        root.unbind_path(&Path::parse("a.b.value"), &callback);
        assert_eq!(root.listener_count("change:a"), 0);
        assert_eq!(a.listener_count("change:b"), 0);
        assert_eq!(b.listener_count("change:value"), 0);
    }

    #[test]
    fn empty_path_is_noop() {
        let root = Model::new();
        let (callback, _) = counting_callback();
        root.bind_path(&Path::default(), &callback);
        root.unbind_path(&Path::default(), &callback);
        assert_eq!(root.total_listeners(), 0);
    }

    #[test]
    fn two_callbacks_on_same_path_are_independent() {
        let (root, _, b) = graph();
        let path = Path::parse("a.b.value");
        let (cb1, count1) = counting_callback();
        let (cb2, count2) = counting_callback();
        root.bind_path(&path, &cb1);
        root.bind_path(&path, &cb2);

        b.set(attrs! { "value" => 7 }, &SetOptions::default());
        assert_eq!((*count1.borrow(), *count2.borrow()), (1, 1));

        root.unbind_path(&path, &cb1);
        b.set(attrs! { "value" => 8 }, &SetOptions::default());
        assert_eq!((*count1.borrow(), *count2.borrow()), (1, 2));
    }

    #[test]
    fn resolution_through_computed_accessor() {
        use crate::computed::ComputedSpec;

        let b = Model::with_attrs(attrs! { "value" => 42 });
        let b_for_accessor = b.clone();
        let root = Model::builder()
            .computed(ComputedSpec::new("link", move |_: &Model| {
                Value::Model(b_for_accessor.clone())
            }))
            .build();

        assert_eq!(root.resolve(&Path::parse("link.value")), Value::from(42));
    }

    #[test]
    fn length_pseudo_attribute_on_collections() {
        use crate::collection::Collection;

        let list = Collection::from_items([Value::from(1), Value::from(2)]);
        let root = Model::with_attrs(attrs! { "items" => list });
        assert_eq!(root.resolve(&Path::parse("items.length")), Value::from(2));
        assert_eq!(root.resolve(&Path::parse("items.missing")), Value::Null);
    }
}
