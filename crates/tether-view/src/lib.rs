#![forbid(unsafe_code)]

//! Composable view tree bound to reactive models.
//!
//! A [`View`] is a render unit: it owns a mount address on a
//! [`RenderTarget`], evaluates a template against its context model, and
//! composes into a parent/child tree with an explicit cleanup contract.
//! [`CollectionView`] mirrors an observable collection's membership
//! incrementally — adds append one child, removes drop one child, bulk
//! resets re-render.
//!
//! Templates receive a [`Scope`] offering block directives: a nested view
//! bound to a sub-context, a collection rendered as repeated item views, or
//! a single bound scalar. Each directive creates exactly one child whose
//! cleanup runs when the enclosing render is torn down.
//!
//! The [`Dispatcher`] is the owned event hub: views register their declared
//! event-delegation handlers there in `after_render` and unregister in
//! `cleanup`; it also tracks the current focus target.
//!
//! # Lifecycle
//!
//! constructed → mounted → (update)* → cleaned-up (terminal). `cleanup()`
//! releases every change-path subscription the node registered against its
//! context, then recursively cleans its children. A cleaned-up view refuses
//! to render again.

pub mod collection_view;
pub mod dispatcher;
pub mod scope;
pub mod target;
pub mod view;

pub use collection_view::CollectionView;
pub use dispatcher::{DispatchedEvent, Dispatcher};
pub use scope::{Scope, SubviewConfig};
pub use target::{MemoryTarget, RenderTarget, SharedTarget, shared_target};
pub use view::{Template, View, ViewError};

use std::cell::Cell;

thread_local! {
    static NEXT_VIEW_ID: Cell<u64> = const { Cell::new(1) };
}

pub(crate) fn next_view_id() -> u64 {
    NEXT_VIEW_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        id
    })
}
