#![forbid(unsafe_code)]

//! Template scope: the declarative binding surface.
//!
//! Templates receive a [`Scope`] and call its block directives to embed
//! reactive children:
//!
//! - [`Scope::subview`] — a nested view bound to a sub-context at a path;
//! - [`Scope::collection`] — a collection rendered as repeated item views;
//! - [`Scope::value`] — a single bound scalar at a path.
//!
//! Each directive returns the placeholder markup to splice into the
//! template's output and records a pending child; the enclosing view
//! materializes the pending children when the render commits, and tears
//! them down when it is cleaned up or re-rendered. One directive call
//! creates exactly one child render unit.

use tether_core::Path;

use crate::view::Template;

/// Configuration for a [`Scope::subview_with`] directive.
#[derive(Clone)]
pub struct SubviewConfig {
    /// DOM id for the child's root element; generated when absent.
    pub dom_id: Option<String>,
    /// Root element tag of the child.
    pub tag: String,
    /// Class-binding expression (comma-separated attribute paths).
    pub class_binding: Option<String>,
}

impl Default for SubviewConfig {
    fn default() -> Self {
        Self {
            dom_id: None,
            tag: "div".to_owned(),
            class_binding: None,
        }
    }
}

impl core::fmt::Debug for SubviewConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubviewConfig")
            .field("dom_id", &self.dom_id)
            .field("tag", &self.tag)
            .field("class_binding", &self.class_binding)
            .finish()
    }
}

/// A child recorded by a directive, materialized after template evaluation.
pub(crate) enum PendingChild {
    Subview {
        address: String,
        path: Path,
        template: Template,
        config: SubviewConfig,
    },
    Collection {
        address: String,
        path: Path,
        item_template: Template,
        item_tag: String,
    },
    Value {
        address: String,
        path: Path,
    },
}

/// Directive surface handed to templates during evaluation.
pub struct Scope {
    base: String,
    counter: u32,
    pending: Vec<PendingChild>,
}

impl Scope {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.to_owned(),
            counter: 0,
            pending: Vec::new(),
        }
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingChild> {
        std::mem::take(&mut self.pending)
    }

    fn next_address(&mut self) -> String {
        self.counter += 1;
        format!("{}/{}", self.base, self.counter)
    }

    /// Embed a nested view bound to the sub-context at `path` (an empty
    /// path binds the enclosing context). Returns placeholder markup.
    pub fn subview(&mut self, path: &str, template: Template) -> String {
        self.subview_with(path, template, SubviewConfig::default())
    }

    /// Embed a nested view with explicit configuration.
    pub fn subview_with(&mut self, path: &str, template: Template, config: SubviewConfig) -> String {
        let address = self.next_address();
        let markup = format!("<div id=\"{address}\"></div>");
        self.pending.push(PendingChild::Subview {
            address,
            path: Path::parse(path),
            template,
            config,
        });
        markup
    }

    /// Embed the collection at `path` as repeated item views.
    pub fn collection(&mut self, path: &str, item_template: Template) -> String {
        self.collection_with(path, item_template, "div")
    }

    /// Embed the collection at `path` with an explicit item tag name.
    pub fn collection_with(
        &mut self,
        path: &str,
        item_template: Template,
        item_tag: &str,
    ) -> String {
        let address = self.next_address();
        let markup = format!("<div id=\"{address}\"></div>");
        self.pending.push(PendingChild::Collection {
            address,
            path: Path::parse(path),
            item_template,
            item_tag: item_tag.to_owned(),
        });
        markup
    }

    /// Embed a single bound scalar: renders the value at `path` and
    /// re-renders it on every change.
    pub fn value(&mut self, path: &str) -> String {
        let address = self.next_address();
        let markup = format!("<span id=\"{address}\"></span>");
        self.pending.push(PendingChild::Value {
            address,
            path: Path::parse(path),
        });
        markup
    }

    /// Number of directives recorded so far.
    #[must_use]
    pub fn directive_count(&self) -> usize {
        self.pending.len()
    }
}

impl core::fmt::Debug for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scope")
            .field("base", &self.base)
            .field("pending", &self.pending.len())
            .finish()
    }
}
