#![forbid(unsafe_code)]

//! Core primitives for the tether reactive layer.
//!
//! This crate is deliberately leaf-level: it knows nothing about models,
//! collections, or views. It provides the two mechanisms everything above it
//! is built from:
//!
//! - [`Path`]: a dot-delimited address into an object graph
//!   (`"customer.address.city"`), with the head/suffix splitting that chained
//!   change subscriptions need.
//! - [`Emitter`]: an ordered, identity-keyed listener registry generic over
//!   its payload type. Owners snapshot listener lists before firing so that
//!   callbacks may subscribe and unsubscribe reentrantly.
//!
//! # Invariants
//!
//! 1. Listeners fire in registration order.
//! 2. Listener identity is `Rc` pointer identity; removing a listener requires
//!    the same `Rc` (or a clone of it) that was registered.
//! 3. Firing never holds the registry borrowed: [`Emitter::snapshot`] returns
//!    owned clones so listeners can freely mutate the registry.

pub mod emitter;
pub mod path;

pub use emitter::{AnyListener, Emitter, Listener};
pub use path::Path;
