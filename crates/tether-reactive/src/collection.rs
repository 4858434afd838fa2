#![forbid(unsafe_code)]

//! Ordered observable collections.
//!
//! A [`Collection`] is a shared handle over an ordered list of [`Value`]s.
//! Membership changes fire `"add"`, `"remove"`, and `"refresh"` events.
//! Model members additionally have their own events forwarded at the
//! collection level through a catch-all subscription, so one listener on the
//! collection observes `"change:<property>"` for every member — the
//! aggregation computed attributes rely on.
//!
//! Loading is an external seam: a [`Loader`] is handed the collection and a
//! [`LoadCompletion`] that it must consume exactly once. Success resets the
//! membership (firing `"refresh"`); failure only clears the loading flag —
//! no retry, no backoff, the collection stays empty.
//!
//! # Invariants
//!
//! 1. Member forwarders are wired on add/reset and released on
//!    remove/reset; a removed member's events no longer surface.
//! 2. `fetch()` starts at most one in-flight pull; completion is
//!    exactly-once by construction (the completion token is consumed).
//! 3. Items are located by [`Identity`], so two structurally equal models
//!    are distinct members.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tether_core::{AnyListener, Emitter, Listener};

use crate::event::{Event, SetOptions};
use crate::model::Model;
use crate::next_id;
use crate::value::{Identity, Value};

/// Shared ordered observable list.
#[derive(Clone)]
pub struct Collection {
    pub(crate) inner: Rc<RefCell<CollectionInner>>,
}

pub(crate) struct CollectionInner {
    id: u64,
    items: Vec<Value>,
    emitter: Emitter<Event>,
    forwarders: Vec<(Model, AnyListener<Event>)>,
    loader: Option<Rc<dyn Loader>>,
    loading: bool,
}

/// External data source for a collection's one-shot pull.
pub trait Loader {
    /// Begin loading. The implementation must eventually consume
    /// `completion` exactly once, via [`LoadCompletion::resolve`] or
    /// [`LoadCompletion::reject`].
    fn load(&self, collection: Collection, completion: LoadCompletion);
}

/// Failure signal for a load.
#[derive(Clone, Debug)]
pub struct LoadError {
    message: String,
}

impl LoadError {
    /// Create a load error with a human-readable message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl core::fmt::Display for LoadError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "load failed: {}", self.message)
    }
}

impl std::error::Error for LoadError {}

/// One-shot completion token handed to a [`Loader`].
#[derive(Debug)]
pub struct LoadCompletion {
    collection: Collection,
}

impl LoadCompletion {
    /// Successful load: clears the loading flag and resets the membership,
    /// firing `"refresh"`.
    pub fn resolve(self, items: Vec<Value>) {
        self.collection.inner.borrow_mut().loading = false;
        self.collection.reset(items, &SetOptions::default());
    }

    /// Failed load: clears the loading flag and nothing else. The
    /// collection stays empty and does not reload automatically.
    pub fn reject(self, _error: LoadError) {
        self.collection.inner.borrow_mut().loading = false;
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(CollectionInner {
                id: next_id(),
                items: Vec::new(),
                emitter: Emitter::new(),
                forwarders: Vec::new(),
                loader: None,
                loading: false,
            })),
        }
    }

    /// Create a collection from initial items. No events fire; member
    /// forwarders are wired.
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = Value>) -> Self {
        let collection = Self::new();
        for item in items {
            collection.wire_forwarder(&item);
            collection.inner.borrow_mut().items.push(item);
        }
        collection
    }

    /// Construction-time identity, unique per process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    /// Whether the collection has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().items.is_empty()
    }

    /// Clone of the current membership, in order.
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.inner.borrow().items.clone()
    }

    /// The item at `index`, if any.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<Value> {
        self.inner.borrow().items.get(index).cloned()
    }

    /// Position of the item with `item`'s identity.
    #[must_use]
    pub fn index_of(&self, item: &Value) -> Option<usize> {
        let identity = item.identity();
        self.inner
            .borrow()
            .items
            .iter()
            .position(|candidate| candidate.identity() == identity)
    }

    /// Pseudo-attributes readable through path resolution.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Value {
        match key {
            "length" => Value::from(self.len()),
            _ => Value::Null,
        }
    }

    /// Append an item and fire `"add"` (unless silent).
    pub fn add(&self, item: Value, options: &SetOptions) -> &Self {
        self.wire_forwarder(&item);
        self.inner.borrow_mut().items.push(item.clone());
        if !options.silent {
            self.trigger(
                "add",
                &Event::Add {
                    collection: self.clone(),
                    item,
                    options: options.clone(),
                },
            );
        }
        self
    }

    /// Remove the member matching `item`'s identity and fire `"remove"`
    /// (unless silent). Unknown items are a silent no-op.
    pub fn remove(&self, item: &Value, options: &SetOptions) -> &Self {
        let removed = {
            let identity = item.identity();
            let mut inner = self.inner.borrow_mut();
            inner
                .items
                .iter()
                .position(|candidate| candidate.identity() == identity)
                .map(|position| inner.items.remove(position))
        };
        let Some(removed) = removed else {
            return self;
        };
        self.unwire_forwarder(&removed);
        if !options.silent {
            self.trigger(
                "remove",
                &Event::Remove {
                    collection: self.clone(),
                    item: removed,
                    options: options.clone(),
                },
            );
        }
        self
    }

    /// Replace the whole membership and fire `"refresh"` (unless silent).
    pub fn reset(&self, items: Vec<Value>, options: &SetOptions) -> &Self {
        let old_items = std::mem::take(&mut self.inner.borrow_mut().items);
        for item in &old_items {
            self.unwire_forwarder(item);
        }
        for item in &items {
            self.wire_forwarder(item);
        }
        self.inner.borrow_mut().items = items;
        if !options.silent {
            self.trigger(
                "refresh",
                &Event::Refresh {
                    collection: self.clone(),
                    options: options.clone(),
                },
            );
        }
        self
    }

    /// Install the external loader used by [`fetch`](Collection::fetch).
    pub fn set_loader(&self, loader: Rc<dyn Loader>) -> &Self {
        self.inner.borrow_mut().loader = Some(loader);
        self
    }

    /// Whether a loader is installed.
    #[must_use]
    pub fn has_loader(&self) -> bool {
        self.inner.borrow().loader.is_some()
    }

    /// Whether a pull is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.borrow().loading
    }

    /// Start one pull from the loader. Returns `false` (and does nothing)
    /// when no loader is installed or a pull is already in flight.
    pub fn fetch(&self) -> bool {
        let loader = {
            let mut inner = self.inner.borrow_mut();
            if inner.loading {
                return false;
            }
            let Some(loader) = inner.loader.clone() else {
                return false;
            };
            inner.loading = true;
            loader
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(collection = self.id(), "fetch");
        loader.load(
            self.clone(),
            LoadCompletion {
                collection: self.clone(),
            },
        );
        true
    }

    /// Register a listener for `event`.
    pub fn on(&self, event: &str, listener: Listener<Event>) -> &Self {
        self.inner.borrow_mut().emitter.on(event, listener);
        self
    }

    /// Remove the first registration of `listener` for `event` by identity.
    pub fn off(&self, event: &str, listener: &Listener<Event>) -> &Self {
        self.inner.borrow_mut().emitter.off(event, listener);
        self
    }

    /// Fire `event` to all matching listeners (registry snapshotted first).
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

    /// Number of named listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.borrow().emitter.listener_count(event)
    }

    /// Surface a model member's events at the collection level.
    fn wire_forwarder(&self, item: &Value) {
        let Value::Model(member) = item else {
            return;
        };
        let weak: Weak<RefCell<CollectionInner>> = Rc::downgrade(&self.inner);
        let forwarder: AnyListener<Event> = Rc::new(move |event, payload| {
            if let Some(inner) = weak.upgrade() {
                Collection { inner }.trigger(event, payload);
            }
        });
        member.on_any(Rc::clone(&forwarder));
        self.inner
            .borrow_mut()
            .forwarders
            .push((member.clone(), forwarder));
    }

    /// Release the forwarder wired for a model member, if any.
    fn unwire_forwarder(&self, item: &Value) {
        let Value::Model(member) = item else {
            return;
        };
        let found = {
            let mut inner = self.inner.borrow_mut();
            inner
                .forwarders
                .iter()
                .position(|(candidate, _)| candidate.id() == member.id())
                .map(|position| inner.forwarders.remove(position))
        };
        if let Some((member, forwarder)) = found {
            member.off_any(&forwarder);
        }
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl core::fmt::Debug for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Collection")
            .field("id", &inner.id)
            .field("items", &inner.items.len())
            .field("loading", &inner.loading)
            .finish()
    }
}

/// Look up a member by identity.
#[must_use]
pub fn find_by_identity(collection: &Collection, identity: Identity) -> Option<Value> {
    collection
        .items()
        .into_iter()
        .find(|item| item.identity() == identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use std::cell::Cell;

    #[test]
    fn add_remove_membership() {
        let collection = Collection::new();
        let item = Value::Model(Model::with_attrs(attrs! { "n" => 1 }));
        collection.add(item.clone(), &SetOptions::default());
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.index_of(&item), Some(0));

        collection.remove(&item, &SetOptions::default());
        assert!(collection.is_empty());
        assert_eq!(collection.index_of(&item), None);
    }

    #[test]
    fn membership_events() {
        let collection = Collection::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for event in ["add", "remove", "refresh"] {
            let log = Rc::clone(&log);
            collection.on(event, Rc::new(move |_| log.borrow_mut().push(event)));
        }

        let item = Value::from(1);
        collection.add(item.clone(), &SetOptions::default());
        collection.remove(&item, &SetOptions::default());
        collection.reset(vec![Value::from(2)], &SetOptions::default());
        assert_eq!(*log.borrow(), ["add", "remove", "refresh"]);
    }

    #[test]
    fn silent_mutations_fire_nothing() {
        let collection = Collection::new();
        let count = Rc::new(Cell::new(0u32));
        for event in ["add", "remove", "refresh"] {
            let c = Rc::clone(&count);
            collection.on(event, Rc::new(move |_| c.set(c.get() + 1)));
        }

        let item = Value::from(1);
        collection.add(item.clone(), &SetOptions::silent());
        collection.remove(&item, &SetOptions::silent());
        collection.reset(vec![], &SetOptions::silent());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn member_events_surface_at_collection_level() {
        let member = Model::with_attrs(attrs! { "done" => false });
        let collection = Collection::from_items([Value::Model(member.clone())]);

        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        collection.on("change:done", Rc::new(move |_| c.set(c.get() + 1)));

        member.set(attrs! { "done" => true }, &SetOptions::default());
        assert_eq!(count.get(), 1);

        // Removing the member releases the forwarder.
        collection.remove(&Value::Model(member.clone()), &SetOptions::default());
        member.set(attrs! { "done" => false }, &SetOptions::default());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn reset_rewires_forwarders() {
        let old_member = Model::with_attrs(attrs! { "x" => 1 });
        let collection = Collection::from_items([Value::Model(old_member.clone())]);

        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        collection.on("change:x", Rc::new(move |_| c.set(c.get() + 1)));

        let new_member = Model::with_attrs(attrs! { "x" => 2 });
        collection.reset(vec![Value::Model(new_member.clone())], &SetOptions::default());

        old_member.set(attrs! { "x" => 10 }, &SetOptions::default());
        assert_eq!(count.get(), 0, "old member unwired");

        new_member.set(attrs! { "x" => 20 }, &SetOptions::default());
        assert_eq!(count.get(), 1, "new member wired");
    }

    #[test]
    fn remove_unknown_item_is_noop() {
        let collection = Collection::from_items([Value::from(1)]);
        let count = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&count);
        collection.on("remove", Rc::new(move |_| c.set(c.get() + 1)));

        collection.remove(&Value::from(99), &SetOptions::default());
        assert_eq!(collection.len(), 1);
        assert_eq!(count.get(), 0);
    }

    struct ImmediateLoader {
        items: Vec<Value>,
    }

    impl Loader for ImmediateLoader {
        fn load(&self, _collection: Collection, completion: LoadCompletion) {
            completion.resolve(self.items.clone());
        }
    }

    /// Captures the completion token so a test can resolve it "later on the
    /// same event loop".
    struct DeferredLoader {
        pending: Rc<RefCell<Option<LoadCompletion>>>,
    }

    impl Loader for DeferredLoader {
        fn load(&self, _collection: Collection, completion: LoadCompletion) {
            *self.pending.borrow_mut() = Some(completion);
        }
    }

    #[test]
    fn fetch_resolves_and_refreshes() {
        let collection = Collection::new();
        collection.set_loader(Rc::new(ImmediateLoader {
            items: vec![Value::from(1), Value::from(2)],
        }));

        let refreshed = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&refreshed);
        collection.on("refresh", Rc::new(move |_| r.set(r.get() + 1)));

        assert!(collection.fetch());
        assert_eq!(collection.len(), 2);
        assert_eq!(refreshed.get(), 1);
        assert!(!collection.is_loading());
    }

    #[test]
    fn fetch_without_loader_is_noop() {
        let collection = Collection::new();
        assert!(!collection.fetch());
    }

    #[test]
    fn at_most_one_pull_in_flight() {
        let pending = Rc::new(RefCell::new(None));
        let collection = Collection::new();
        collection.set_loader(Rc::new(DeferredLoader {
            pending: Rc::clone(&pending),
        }));

        assert!(collection.fetch());
        assert!(collection.is_loading());
        assert!(!collection.fetch(), "second fetch while in flight");

        pending
            .borrow_mut()
            .take()
            .expect("first fetch reached loader")
            .resolve(vec![Value::from(1)]);
        assert!(!collection.is_loading());
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn rejected_load_leaves_collection_empty() {
        let pending = Rc::new(RefCell::new(None));
        let collection = Collection::new();
        collection.set_loader(Rc::new(DeferredLoader {
            pending: Rc::clone(&pending),
        }));

        let refreshed = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&refreshed);
        collection.on("refresh", Rc::new(move |_| r.set(r.get() + 1)));

        collection.fetch();
        pending
            .borrow_mut()
            .take()
            .expect("loader invoked")
            .reject(LoadError::new("backend down"));

        assert!(collection.is_empty());
        assert!(!collection.is_loading());
        assert_eq!(refreshed.get(), 0, "failure signals nothing");
    }

    #[test]
    fn length_pseudo_attribute() {
        let collection = Collection::from_items([Value::from(1)]);
        assert_eq!(collection.attribute("length"), Value::from(1));
        assert_eq!(collection.attribute("other"), Value::Null);
    }
}
