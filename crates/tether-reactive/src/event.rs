#![forbid(unsafe_code)]

//! Event payloads and set options.
//!
//! Every listener in the reactive layer receives an [`Event`]. Change events
//! carry the originating model, the changed key (absent for the aggregate
//! `"change"` event), and the new value; collection events carry the
//! collection and the affected item. The [`SetOptions`] travel with the
//! payload so downstream listeners can honor them.

use crate::collection::Collection;
use crate::model::Model;
use crate::value::Value;

/// Options recognized by mutating operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Suppress change events for this mutation. State and the
    /// previous-attributes snapshot still update.
    pub silent: bool,
}

impl SetOptions {
    /// Options with `silent` set.
    #[must_use]
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

/// Payload delivered to listeners.
#[derive(Clone, Debug)]
pub enum Event {
    /// An attribute changed (`"change:<key>"`), or a set committed
    /// (aggregate `"change"`, with `key` and `value` empty).
    Change {
        /// The model the mutation was applied to.
        target: Model,
        /// The changed attribute, absent on the aggregate event.
        key: Option<String>,
        /// The new value.
        value: Value,
        /// Options of the originating mutation.
        options: SetOptions,
    },
    /// An item was appended to a collection (`"add"`).
    Add {
        /// The collection mutated.
        collection: Collection,
        /// The appended item.
        item: Value,
        /// Options of the originating mutation.
        options: SetOptions,
    },
    /// An item was removed from a collection (`"remove"`).
    Remove {
        /// The collection mutated.
        collection: Collection,
        /// The removed item.
        item: Value,
        /// Options of the originating mutation.
        options: SetOptions,
    },
    /// A collection was bulk-reset (`"refresh"`).
    Refresh {
        /// The collection mutated.
        collection: Collection,
        /// Options of the originating mutation.
        options: SetOptions,
    },
}

impl Event {
    /// The options attached to any event variant.
    #[must_use]
    pub fn options(&self) -> &SetOptions {
        match self {
            Self::Change { options, .. }
            | Self::Add { options, .. }
            | Self::Remove { options, .. }
            | Self::Refresh { options, .. } => options,
        }
    }

    /// The new value of a change event, if this is one.
    #[must_use]
    pub fn change_value(&self) -> Option<&Value> {
        match self {
            Self::Change { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// The event name fired for a keyed attribute change.
#[must_use]
pub fn change_event(key: &str) -> String {
    format!("change:{key}")
}
