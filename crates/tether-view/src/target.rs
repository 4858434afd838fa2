#![forbid(unsafe_code)]

//! Render targets: addressable nodes holding markup strings.
//!
//! The view layer does not define DOM semantics. A target is a flat address
//! space of nodes; a view replaces its node's content with the string its
//! template produced, and a collection view additionally maintains an
//! ordered child list under its node so membership changes are incremental
//! (append/remove one entry) instead of string surgery.
//!
//! [`MemoryTarget`] is the in-process implementation. It counts writes per
//! address so tests can assert that incremental operations leave sibling
//! nodes untouched.

use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// An addressable markup sink.
pub trait RenderTarget {
    /// Replace the content of the node at `address` with `markup`,
    /// creating the node if needed.
    fn replace(&mut self, address: &str, markup: &str);

    /// Append a child node at the end of `address`'s child list.
    fn append_child(&mut self, address: &str, child: &str, markup: &str);

    /// Remove a child node (and its entry in the child list).
    fn remove_child(&mut self, address: &str, child: &str);

    /// The markup currently held by the node at `address`.
    fn contents(&self, address: &str) -> Option<String>;

    /// Ordered child addresses of the node at `address`.
    fn child_order(&self, address: &str) -> Vec<String>;
}

/// Shared handle the view tree holds onto its target.
pub type SharedTarget = Rc<RefCell<dyn RenderTarget>>;

/// Wrap a target implementation into the shared handle views expect.
pub fn shared_target(target: impl RenderTarget + 'static) -> SharedTarget {
    Rc::new(RefCell::new(target))
}

#[derive(Default)]
struct Node {
    markup: String,
    children: Vec<String>,
}

/// In-memory render target with per-address write counters.
#[derive(Default)]
pub struct MemoryTarget {
    nodes: AHashMap<String, Node>,
    writes: AHashMap<String, u32>,
}

impl MemoryTarget {
    /// Create an empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the node at `address` has been written.
    #[must_use]
    pub fn write_count(&self, address: &str) -> u32 {
        self.writes.get(address).copied().unwrap_or(0)
    }

    /// Whether a node exists at `address`.
    #[must_use]
    pub fn has_node(&self, address: &str) -> bool {
        self.nodes.contains_key(address)
    }

    fn bump(&mut self, address: &str) {
        *self.writes.entry(address.to_owned()).or_insert(0) += 1;
    }
}

impl RenderTarget for MemoryTarget {
    fn replace(&mut self, address: &str, markup: &str) {
        let node = self.nodes.entry(address.to_owned()).or_default();
        node.markup = markup.to_owned();
        self.bump(address);
    }

    fn append_child(&mut self, address: &str, child: &str, markup: &str) {
        self.nodes
            .entry(address.to_owned())
            .or_default()
            .children
            .push(child.to_owned());
        let child_node = self.nodes.entry(child.to_owned()).or_default();
        child_node.markup = markup.to_owned();
        self.bump(child);
    }

    fn remove_child(&mut self, address: &str, child: &str) {
        if let Some(node) = self.nodes.get_mut(address) {
            node.children.retain(|candidate| candidate != child);
        }
        self.nodes.remove(child);
        self.writes.remove(child);
    }

    fn contents(&self, address: &str) -> Option<String> {
        self.nodes.get(address).map(|node| node.markup.clone())
    }

    fn child_order(&self, address: &str) -> Vec<String> {
        self.nodes
            .get(address)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }
}

impl core::fmt::Debug for MemoryTarget {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryTarget")
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
