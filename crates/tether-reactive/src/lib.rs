#![forbid(unsafe_code)]

//! Reactive attribute models for tether.
//!
//! This crate implements the observation layer that the view crate renders
//! from:
//!
//! - [`Model`]: a shared, string-keyed attribute map with change events and a
//!   previous-attributes snapshot.
//! - [`Collection`]: an ordered, observable list with member-event
//!   aggregation and an external loader seam.
//! - Chained path bindings ([`Model::bind_path`]): subscriptions that follow
//!   a dotted path through the object graph and migrate automatically when an
//!   intermediate link changes identity.
//! - [`ComputedSpec`]: derived attributes with declared dependencies,
//!   optional caching, and previous-value semantics.
//! - [`TwoWayBinding`]: loop-safe bidirectional attribute synchronization.
//!
//! # Architecture
//!
//! Models and collections are `Rc<RefCell<..>>` handles: cloning a handle
//! shares state, and the whole layer is single-threaded and synchronous.
//! Within one [`Model::set`] call, every chained notification — path
//! rebinding, computed recomputation, downstream view updates — completes
//! before `set` returns. There is no queuing or batching.
//!
//! # Invariants
//!
//! 1. Listeners fire in registration order; chain-rebinding wrappers are
//!    ordinary listeners and interleave accordingly.
//! 2. `previous_attributes()` reflects the state immediately prior to the
//!    most recent committed `set`, even across multiple sets in one
//!    synchronous turn.
//! 3. Binding and unbinding the same path with the same callback leaves
//!    every listener count along the path unchanged (chain symmetry).
//! 4. No emitter borrow is held while listeners run, so listeners may
//!    rebind chains reentrantly.

pub mod binding;
pub mod chain;
#[cfg(feature = "codec")]
pub mod codec;
pub mod collection;
pub mod computed;
pub mod event;
pub mod model;
pub mod value;

pub use binding::{BindingError, TwoWayBinding};
pub use chain::{resolve, resolve_chain};
#[cfg(feature = "codec")]
pub use codec::{CodecError, TypeRegistry};
pub use collection::{Collection, LoadCompletion, LoadError, Loader};
pub use computed::{Accessor, ComputedSpec, Dependency};
pub use event::{Event, SetOptions};
pub use model::{Model, ModelBuilder};
pub use value::{Identity, Value};

use std::cell::Cell;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

/// Process-unique identity for models and collections, assigned at
/// construction. Single-threaded by design, like the rest of the layer.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        id
    })
}

/// Build an attribute list for [`Model::set`] or [`ModelBuilder::attr`]
/// chains from `key => value` pairs.
///
/// ```
/// use tether_reactive::{attrs, Model, SetOptions};
///
/// let model = Model::new();
/// model.set(attrs! { "name" => "Ada", "age" => 36 }, &SetOptions::default());
/// assert_eq!(model.get("name").to_string(), "Ada");
/// ```
#[macro_export]
macro_rules! attrs {
    ($($key:expr => $value:expr),* $(,)?) => {
        vec![$(($key.to_string(), $crate::Value::from($value))),*]
    };
}
