#![forbid(unsafe_code)]

//! Public facade for the tether reactive model/view stack.
//!
//! - [`tether_core`]: paths and the ordered event emitter.
//! - [`tether_reactive`]: observable models, collections, chained path
//!   bindings, computed attributes, two-way bindings.
//! - [`tether_view`] (feature `view`, on by default): render targets, view
//!   trees, collection views, template directives, and the event dispatcher.
//!
//! # Example
//!
//! ```
//! use tether::prelude::*;
//!
//! let address = Model::with_attrs(attrs! { "city" => "Turin" });
//! let customer = Model::with_attrs(attrs! { "address" => address.clone() });
//!
//! // Observe a dotted path; the subscription follows replacements of any
//! // intermediate link.
//! use std::{cell::Cell, rc::Rc};
//! let seen = Rc::new(Cell::new(0));
//! let s = Rc::clone(&seen);
//! let callback: Listener<Event> = Rc::new(move |_| s.set(s.get() + 1));
//! customer.bind_path(&Path::parse("address.city"), &callback);
//!
//! address.set(attrs! { "city" => "Milan" }, &SetOptions::default());
//! assert_eq!(seen.get(), 1);
//! ```

pub use tether_core as core;
pub use tether_reactive as reactive;
#[cfg(feature = "view")]
pub use tether_view as view;

/// Common imports for applications built on tether.
pub mod prelude {
    pub use tether_core::{Emitter, Listener, Path};
    pub use tether_reactive::{
        Collection, ComputedSpec, Dependency, Event, Model, ModelBuilder, SetOptions,
        TwoWayBinding, Value, attrs, resolve, resolve_chain,
    };
    #[cfg(feature = "view")]
    pub use tether_view::{
        CollectionView, Dispatcher, MemoryTarget, RenderTarget, Scope, View, shared_target,
    };
}

pub use prelude::*;
