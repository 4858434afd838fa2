#![forbid(unsafe_code)]

//! Collection views: incremental mirroring of an observable collection.
//!
//! A [`CollectionView`] owns a container render unit plus one child view per
//! collection member, keyed by item identity. Membership changes are
//! incremental: an `"add"` appends exactly one child at the end of the
//! container's child list (no full re-render, existing children untouched),
//! a `"remove"` drops exactly one, and a bulk `"refresh"` tears all children
//! down and rebuilds from the current snapshot.
//!
//! When mounted over an empty, idle collection, the view triggers exactly
//! one pull through the collection's loader and re-renders on the refresh
//! that a successful load fires. A failed load changes nothing — the
//! collection stays empty and is not retried.
//!
//! # Invariants
//!
//! 1. At any quiescent point, the item-view identity set equals the
//!    collection membership, and mounted child order matches collection
//!    order.
//! 2. Construction against a non-collection context is fatal
//!    (`ViewError::NotACollection`).
//! 3. The loader pull is attempted at most once per view.

use std::cell::RefCell;
use std::rc::Rc;

use tether_core::Listener;
use tether_reactive::{Collection, Event, Identity, Model, Value};

use crate::dispatcher::Dispatcher;
use crate::target::SharedTarget;
use crate::view::{Template, View, ViewError};

struct CollectionViewInner {
    container: View,
    collection: Collection,
    item_template: Template,
    item_tag: String,
    items: Vec<(Identity, View)>,
    listeners: Vec<(String, Listener<Event>)>,
    attempted_load: bool,
}

/// Render unit mirroring an ordered collection.
#[derive(Clone)]
pub struct CollectionView {
    inner: Rc<RefCell<CollectionViewInner>>,
}

impl CollectionView {
    /// Create a collection view over `context`, which must be a collection.
    pub fn new(
        context: &Value,
        item_template: Template,
        item_tag: &str,
    ) -> Result<Self, ViewError> {
        let Some(collection) = context.as_collection().cloned() else {
            return Err(ViewError::NotACollection {
                path: String::new(),
            });
        };
        let container = View::new(&Model::new(), |_, _| String::new());
        Ok(Self {
            inner: Rc::new(RefCell::new(CollectionViewInner {
                container,
                collection,
                item_template,
                item_tag: item_tag.to_owned(),
                items: Vec::new(),
                listeners: Vec::new(),
                attempted_load: false,
            })),
        })
    }

    /// The container render unit (root element of the mirrored list).
    #[must_use]
    pub fn container(&self) -> View {
        self.inner.borrow().container.clone()
    }

    /// The bound collection.
    #[must_use]
    pub fn collection(&self) -> Collection {
        self.inner.borrow().collection.clone()
    }

    /// Number of mounted item views.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.inner.borrow().items.len()
    }

    /// The item views in mounted order.
    #[must_use]
    pub fn item_views(&self) -> Vec<View> {
        self.inner
            .borrow()
            .items
            .iter()
            .map(|(_, view)| view.clone())
            .collect()
    }

    /// Attach the dispatcher used for the container and item views.
    pub fn set_dispatcher(&self, dispatcher: &Dispatcher) {
        let container = self.container();
        let _ = container.with_dispatcher(dispatcher);
    }

    /// Mount at `address` on `target`: render the container, populate item
    /// views, activate, and (for an empty idle collection) trigger the
    /// one-shot loader pull.
    pub fn mount(&self, target: &SharedTarget, address: &str) -> Result<(), ViewError> {
        self.mount_shallow(target, address)?;
        self.after_render();
        Ok(())
    }

    /// Mount and render without activation; the enclosing view's
    /// `after_render` pass activates the subtree.
    pub(crate) fn mount_shallow(
        &self,
        target: &SharedTarget,
        address: &str,
    ) -> Result<(), ViewError> {
        self.container().mount_shallow(target, address)?;
        self.subscribe();
        self.populate()?;
        self.maybe_fetch();
        Ok(())
    }

    /// Activate the container's and items' delegated handlers.
    pub fn after_render(&self) {
        self.container().after_render();
        for view in self.item_views() {
            view.after_render();
        }
    }

    /// Release collection subscriptions and every child view. Terminal.
    pub fn cleanup(&self) {
        let (collection, listeners, items, container) = {
            let mut inner = self.inner.borrow_mut();
            (
                inner.collection.clone(),
                std::mem::take(&mut inner.listeners),
                std::mem::take(&mut inner.items),
                inner.container.clone(),
            )
        };
        for (event, listener) in &listeners {
            collection.off(event, listener);
        }
        for (_, view) in items {
            view.cleanup();
        }
        container.cleanup();
    }

    /// Subscribe membership listeners, once.
    fn subscribe(&self) {
        if !self.inner.borrow().listeners.is_empty() {
            return;
        }
        let collection = self.collection();
        let mut listeners: Vec<(String, Listener<Event>)> = Vec::with_capacity(3);

        let weak = Rc::downgrade(&self.inner);
        let on_add: Listener<Event> = Rc::new(move |event| {
            if let (Some(inner), Event::Add { item, .. }) = (weak.upgrade(), event) {
                // Errors cannot surface through an event; a cleaned-up child
                // is the only failure and means teardown already began.
                let _ = (CollectionView { inner }).add_item(item);
            }
        });
        collection.on("add", Rc::clone(&on_add));
        listeners.push(("add".to_owned(), on_add));

        let weak = Rc::downgrade(&self.inner);
        let on_remove: Listener<Event> = Rc::new(move |event| {
            if let (Some(inner), Event::Remove { item, .. }) = (weak.upgrade(), event) {
                (CollectionView { inner }).remove_item(item);
            }
        });
        collection.on("remove", Rc::clone(&on_remove));
        listeners.push(("remove".to_owned(), on_remove));

        let weak = Rc::downgrade(&self.inner);
        let on_refresh: Listener<Event> = Rc::new(move |event| {
            if let (Some(inner), Event::Refresh { .. }) = (weak.upgrade(), event) {
                let _ = (CollectionView { inner }).refresh();
            }
        });
        collection.on("refresh", Rc::clone(&on_refresh));
        listeners.push(("refresh".to_owned(), on_refresh));

        self.inner.borrow_mut().listeners = listeners;
    }

    /// Build item views for the current membership, in order.
    fn populate(&self) -> Result<(), ViewError> {
        for item in self.collection().items() {
            self.add_item(&item)?;
        }
        Ok(())
    }

    /// Append one item view at the end of the container's children.
    fn add_item(&self, item: &Value) -> Result<(), ViewError> {
        let (container, item_template, item_tag) = {
            let inner = self.inner.borrow();
            (
                inner.container.clone(),
                Rc::clone(&inner.item_template),
                inner.item_tag.clone(),
            )
        };
        let (Some(address), Some(target)) = (container.address(), container.target()) else {
            return Ok(());
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(address = %address, "collection_view add");

        let identity = item.identity();
        let context = item
            .as_model()
            .cloned()
            .unwrap_or_else(|| Model::with_attrs([("value".to_owned(), item.clone())]));
        let mut child =
            View::from_template(&context, item_template).with_tag(item_tag.as_str());
        if let Some(dispatcher) = container.dispatcher() {
            child = child.with_dispatcher(&dispatcher);
        }
        child.attach_parent(&container);

        let child_address = item_address(&address, identity);
        child.mount_shallow(&target, &child_address)?;
        let markup = target.borrow().contents(&child_address).unwrap_or_default();
        target
            .borrow_mut()
            .append_child(&address, &child_address, &markup);
        child.after_render();

        self.inner.borrow_mut().items.push((identity, child));
        Ok(())
    }

    /// Remove the item view keyed by `item`'s identity, if mounted.
    fn remove_item(&self, item: &Value) {
        let identity = item.identity();
        let removed = {
            let mut inner = self.inner.borrow_mut();
            inner
                .items
                .iter()
                .position(|(candidate, _)| *candidate == identity)
                .map(|position| inner.items.remove(position))
        };
        let Some((identity, child)) = removed else {
            return;
        };
        let container = self.container();
        if let (Some(address), Some(target)) = (container.address(), container.target()) {
            target
                .borrow_mut()
                .remove_child(&address, &item_address(&address, identity));
        }
        child.cleanup();
    }

    /// Bulk reset: tear every item view down and rebuild from the current
    /// snapshot.
    fn refresh(&self) -> Result<(), ViewError> {
        let (container, old_items) = {
            let mut inner = self.inner.borrow_mut();
            (inner.container.clone(), std::mem::take(&mut inner.items))
        };
        if let (Some(address), Some(target)) = (container.address(), container.target()) {
            for (identity, child) in &old_items {
                target
                    .borrow_mut()
                    .remove_child(&address, &item_address(&address, *identity));
                child.cleanup();
            }
        }
        container.render()?;
        self.populate()
    }

    /// Trigger the one-shot loader pull for an empty, idle collection.
    fn maybe_fetch(&self) {
        let collection = {
            let mut inner = self.inner.borrow_mut();
            if inner.attempted_load
                || !inner.collection.is_empty()
                || inner.collection.is_loading()
            {
                return;
            }
            inner.attempted_load = true;
            inner.collection.clone()
        };
        collection.fetch();
    }
}

impl core::fmt::Debug for CollectionView {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("CollectionView")
            .field("collection", &inner.collection.id())
            .field("items", &inner.items.len())
            .field("attempted_load", &inner.attempted_load)
            .finish()
    }
}

/// Stable per-identity mount address under the container.
fn item_address(base: &str, identity: Identity) -> String {
    match identity {
        Identity::Model(id) => format!("{base}/m{id}"),
        Identity::Collection(id) => format!("{base}/c{id}"),
        Identity::Scalar(hash) => format!("{base}/s{hash:x}"),
    }
}
