#![forbid(unsafe_code)]

//! View nodes: render units with lifecycle and path-binding cleanup.
//!
//! A [`View`] is a shared handle over one render unit. Its lifecycle is
//! *constructed → mounted → (update)\* → cleaned-up (terminal)*:
//!
//! - [`View::mount`] attaches the view to a target address and performs the
//!   first update.
//! - [`View::update`] = cleanup-children, render, after-render.
//! - [`View::render`] evaluates the template against the bound context and
//!   replaces the mount address's content; directive children are rendered
//!   as part of the pass.
//! - [`View::after_render`] wires declared event-delegation handlers into
//!   the dispatcher and recurses into children (children render inside the
//!   parent's pass, then activate afterward so nested delegation attaches
//!   correctly).
//! - [`View::cleanup`] unbinds every change-path subscription the node
//!   registered against its context, then recursively cleans and discards
//!   children. It is terminal: a cleaned-up view refuses to render.
//!
//! The child holds a weak (non-owning) parent reference for locating the
//! root; the parent owns the child list and is the only caller of child
//! `cleanup()`.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | `render`/`update` after `cleanup` | `Err(ViewError::CleanedUp)` |
//! | Collection directive on a non-collection | `Err(ViewError::NotACollection)` |
//! | Subview path unresolvable | Child skipped (data not loaded yet) |
//! | Template panic | Propagates to the `update()` caller |

use core::fmt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;

use tether_core::{Listener, Path};
use tether_reactive::{Event, Model, Value, resolve};

use crate::collection_view::CollectionView;
use crate::dispatcher::{DispatchedEvent, Dispatcher};
use crate::next_view_id;
use crate::scope::{PendingChild, Scope};
use crate::target::SharedTarget;

/// Template: evaluates the bound context into markup, recording directive
/// children on the scope.
pub type Template = Rc<dyn Fn(&Model, &mut Scope) -> String>;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub(crate) struct ViewState: u8 {
        const MOUNTED  = 1 << 0;
        const RENDERED = 1 << 1;
        const CLEANED  = 1 << 2;
    }
}

/// Errors from view construction and rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    /// A collection directive (or `CollectionView::new`) was handed a
    /// context that is not a collection.
    NotACollection {
        /// The directive path, empty for direct construction.
        path: String,
    },
    /// The view was already cleaned up; it must not render again.
    CleanedUp,
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotACollection { path } if path.is_empty() => {
                write!(f, "collection view requires a collection context")
            }
            Self::NotACollection { path } => {
                write!(f, "collection view requires a collection at '{path}'")
            }
            Self::CleanedUp => write!(f, "view was cleaned up and cannot render"),
        }
    }
}

impl std::error::Error for ViewError {}

/// Declared event delegation entry.
pub(crate) struct Delegate {
    event: String,
    selector: String,
    handler: Rc<dyn Fn(&DispatchedEvent)>,
}

/// A change-path subscription this view registered against a model, to be
/// released at cleanup.
struct PathBinding {
    root: Model,
    path: Path,
    callback: Listener<Event>,
}

/// A directive child owned by a view.
#[derive(Clone)]
pub(crate) enum ChildNode {
    View(View),
    Collection(CollectionView),
}

impl ChildNode {
    fn after_render(&self) {
        match self {
            Self::View(view) => view.after_render(),
            Self::Collection(collection) => collection.after_render(),
        }
    }

    fn cleanup(&self) {
        match self {
            Self::View(view) => view.cleanup(),
            Self::Collection(collection) => collection.cleanup(),
        }
    }
}

pub(crate) struct ViewInner {
    id: u64,
    dom_id: String,
    tag: String,
    attrs: Vec<(String, String)>,
    classes: Vec<String>,
    address: Option<String>,
    target: Option<SharedTarget>,
    dispatcher: Option<Dispatcher>,
    context: Model,
    template: Template,
    parent: Option<Weak<RefCell<ViewInner>>>,
    children: Vec<ChildNode>,
    delegates: Vec<Delegate>,
    delegates_active: bool,
    bindings: Vec<PathBinding>,
    last_inner: String,
    state: ViewState,
}

/// Shared render-unit handle.
#[derive(Clone)]
pub struct View {
    pub(crate) inner: Rc<RefCell<ViewInner>>,
}

impl View {
    /// Create a view bound to `context` with a template closure.
    #[must_use]
    pub fn new(context: &Model, template: impl Fn(&Model, &mut Scope) -> String + 'static) -> Self {
        Self::from_template(context, Rc::new(template))
    }

    /// Create a view from an already-shared template.
    #[must_use]
    pub fn from_template(context: &Model, template: Template) -> Self {
        let id = next_view_id();
        Self {
            inner: Rc::new(RefCell::new(ViewInner {
                id,
                dom_id: format!("view-{id}"),
                tag: "div".to_owned(),
                attrs: Vec::new(),
                classes: Vec::new(),
                address: None,
                target: None,
                dispatcher: None,
                context: context.clone(),
                template,
                parent: None,
                children: Vec::new(),
                delegates: Vec::new(),
                delegates_active: false,
                bindings: Vec::new(),
                last_inner: String::new(),
                state: ViewState::empty(),
            })),
        }
    }

    /// A value view: renders the resolution of `path` against `context` and
    /// re-renders on every change along the path.
    #[must_use]
    pub fn bound_value(context: &Model, path: &Path) -> Self {
        let template_path = path.clone();
        let view = Self::new(context, move |ctx: &Model, _: &mut Scope| {
            resolve(&template_path, &Value::Model(ctx.clone())).to_string()
        })
        .with_tag("span");

        let weak = Rc::downgrade(&view.inner);
        let callback: Listener<Event> = Rc::new(move |_| {
            if let Some(inner) = weak.upgrade() {
                // A value template has no directives and cannot fail.
                let _ = (View { inner }).render();
            }
        });
        context.bind_path(path, &callback);
        view.inner.borrow_mut().bindings.push(PathBinding {
            root: context.clone(),
            path: path.clone(),
            callback,
        });
        view
    }

    /// Construction-time identity of this render unit.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// DOM id serialized onto the root element.
    #[must_use]
    pub fn dom_id(&self) -> String {
        self.inner.borrow().dom_id.clone()
    }

    /// The bound context model.
    #[must_use]
    pub fn context(&self) -> Model {
        self.inner.borrow().context.clone()
    }

    /// Mount address, once mounted.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        self.inner.borrow().address.clone()
    }

    /// Override the root element's DOM id.
    #[must_use]
    pub fn with_dom_id(self, dom_id: impl Into<String>) -> Self {
        self.inner.borrow_mut().dom_id = dom_id.into();
        self
    }

    /// Set the root element tag.
    #[must_use]
    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        self.inner.borrow_mut().tag = tag.into();
        self
    }

    /// Add an extra root element attribute.
    #[must_use]
    pub fn with_attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner
            .borrow_mut()
            .attrs
            .push((name.into(), value.into()));
        self
    }

    /// Attach the dispatcher this view (and its children) registers
    /// delegated handlers with.
    #[must_use]
    pub fn with_dispatcher(self, dispatcher: &Dispatcher) -> Self {
        self.inner.borrow_mut().dispatcher = Some(dispatcher.clone());
        self
    }

    /// Declare a delegated event handler, wired at `after_render`.
    #[must_use]
    pub fn delegate(
        self,
        event: impl Into<String>,
        selector: impl Into<String>,
        handler: impl Fn(&DispatchedEvent) + 'static,
    ) -> Self {
        self.inner.borrow_mut().delegates.push(Delegate {
            event: event.into(),
            selector: selector.into(),
            handler: Rc::new(handler),
        });
        self
    }

    /// Declare class bindings: a comma-separated list of attribute paths.
    ///
    /// Per path, the initial class is the last segment (`"not_<segment>"`
    /// when the resolved value is falsy), computed once here; a live path
    /// binding toggles the class pair on every change.
    #[must_use]
    pub fn with_class_binding(self, spec: &str) -> Self {
        for raw in spec.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let path = Path::parse(raw);
            let Some(segment) = path.last().map(str::to_owned) else {
                continue;
            };
            let context = self.inner.borrow().context.clone();
            let truthy = resolve(&path, &Value::Model(context.clone())).is_truthy();
            let initial = if truthy {
                segment.clone()
            } else {
                format!("not_{segment}")
            };
            self.inner.borrow_mut().classes.push(initial);

            let weak = Rc::downgrade(&self.inner);
            let toggle_path = path.clone();
            let callback: Listener<Event> = Rc::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    let view = View { inner };
                    let context = view.context();
                    let truthy =
                        resolve(&toggle_path, &Value::Model(context)).is_truthy();
                    view.toggle_class(&segment, truthy);
                }
            });
            context.bind_path(&path, &callback);
            self.inner.borrow_mut().bindings.push(PathBinding {
                root: context,
                path,
                callback,
            });
        }
        self
    }

    /// Current class list on the root element.
    #[must_use]
    pub fn classes(&self) -> Vec<String> {
        self.inner.borrow().classes.clone()
    }

    /// The parent view, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<View> {
        self.inner
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| View { inner })
    }

    /// Walk parents to the root of the view tree.
    #[must_use]
    pub fn root(&self) -> View {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    pub(crate) fn attach_parent(&self, parent: &View) {
        self.inner.borrow_mut().parent = Some(Rc::downgrade(&parent.inner));
    }

    pub(crate) fn target(&self) -> Option<SharedTarget> {
        self.inner.borrow().target.clone()
    }

    pub(crate) fn dispatcher(&self) -> Option<Dispatcher> {
        self.inner.borrow().dispatcher.clone()
    }

    /// Mount at `address` on `target` and perform the first update.
    pub fn mount(&self, target: &SharedTarget, address: &str) -> Result<(), ViewError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state.contains(ViewState::CLEANED) {
                return Err(ViewError::CleanedUp);
            }
            inner.target = Some(Rc::clone(target));
            inner.address = Some(address.to_owned());
            inner.state.insert(ViewState::MOUNTED);
        }
        self.update()
    }

    /// Mount and render without activation; the parent's `after_render`
    /// pass activates the subtree.
    pub(crate) fn mount_shallow(
        &self,
        target: &SharedTarget,
        address: &str,
    ) -> Result<(), ViewError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state.contains(ViewState::CLEANED) {
                return Err(ViewError::CleanedUp);
            }
            inner.target = Some(Rc::clone(target));
            inner.address = Some(address.to_owned());
            inner.state.insert(ViewState::MOUNTED);
        }
        self.render()
    }

    /// Re-render: cleanup children, render, after-render.
    pub fn update(&self) -> Result<(), ViewError> {
        if self.inner.borrow().state.contains(ViewState::CLEANED) {
            return Err(ViewError::CleanedUp);
        }
        self.cleanup_children();
        self.render()?;
        self.after_render();
        Ok(())
    }

    /// Evaluate the template and replace the mount address's content,
    /// rendering directive children as part of the pass. A no-op before
    /// mounting.
    pub fn render(&self) -> Result<(), ViewError> {
        let (context, template, address, target, dispatcher) = {
            let inner = self.inner.borrow();
            if inner.state.contains(ViewState::CLEANED) {
                return Err(ViewError::CleanedUp);
            }
            let (Some(address), Some(target)) = (inner.address.clone(), inner.target.clone())
            else {
                return Ok(());
            };
            (
                inner.context.clone(),
                Rc::clone(&inner.template),
                address,
                target,
                inner.dispatcher.clone(),
            )
        };
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("view_render", view = self.id(), address = %address)
            .entered();

        let mut scope = Scope::new(&address);
        let markup = template(&context, &mut scope);
        {
            let mut inner = self.inner.borrow_mut();
            inner.last_inner = markup;
            inner.state.insert(ViewState::RENDERED);
        }
        target
            .borrow_mut()
            .replace(&address, &self.render_to_string());

        for pending in scope.take_pending() {
            self.materialize(pending, &context, &target, dispatcher.as_ref())?;
        }
        Ok(())
    }

    /// Activate delegated handlers (idempotently) and recurse into children.
    pub fn after_render(&self) {
        let registrations = {
            let mut inner = self.inner.borrow_mut();
            if inner.delegates_active || inner.dispatcher.is_none() || inner.address.is_none() {
                None
            } else {
                inner.delegates_active = true;
                let address = inner.address.clone().unwrap_or_default();
                let dispatcher = inner.dispatcher.clone().expect("checked above");
                let id = inner.id;
                Some((
                    dispatcher,
                    id,
                    address,
                    inner
                        .delegates
                        .iter()
                        .map(|d| (d.event.clone(), d.selector.clone(), Rc::clone(&d.handler)))
                        .collect::<Vec<_>>(),
                ))
            }
        };
        if let Some((dispatcher, id, address, delegates)) = registrations {
            for (event, selector, handler) in delegates {
                dispatcher.register(id, &address, &event, &selector, handler);
            }
        }
        let children = self.inner.borrow().children.clone();
        for child in children {
            child.after_render();
        }
    }

    /// Release every subscription this node and its children registered.
    /// Terminal and idempotent.
    pub fn cleanup(&self) {
        if self.inner.borrow().state.contains(ViewState::CLEANED) {
            return;
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("view_cleanup", view = self.id()).entered();

        let bindings = std::mem::take(&mut self.inner.borrow_mut().bindings);
        for binding in bindings {
            binding.root.unbind_path(&binding.path, &binding.callback);
        }
        let (dispatcher, id) = {
            let inner = self.inner.borrow();
            (inner.dispatcher.clone(), inner.id)
        };
        if let Some(dispatcher) = dispatcher {
            dispatcher.unregister_view(id);
        }
        self.cleanup_children();
        let mut inner = self.inner.borrow_mut();
        inner.delegates_active = false;
        inner.state.insert(ViewState::CLEANED);
    }

    /// Clean up and discard all children.
    pub(crate) fn cleanup_children(&self) {
        let children = std::mem::take(&mut self.inner.borrow_mut().children);
        for child in children {
            child.cleanup();
        }
    }

    /// Serialize the root element: tag, DOM id, class list, extra
    /// attributes, and the last rendered inner markup.
    #[must_use]
    pub fn render_to_string(&self) -> String {
        let inner = self.inner.borrow();
        let mut open = format!("<{} id=\"{}\"", inner.tag, inner.dom_id);
        if !inner.classes.is_empty() {
            open.push_str(&format!(" class=\"{}\"", inner.classes.join(" ")));
        }
        for (name, value) in &inner.attrs {
            open.push_str(&format!(" {name}=\"{value}\""));
        }
        format!("{open}>{}</{}>", inner.last_inner, inner.tag)
    }

    /// Flip one class-binding pair and patch the mounted root in place
    /// (no template re-evaluation, children untouched).
    fn toggle_class(&self, segment: &str, truthy: bool) {
        let on = if truthy {
            segment.to_owned()
        } else {
            format!("not_{segment}")
        };
        let off = if truthy {
            format!("not_{segment}")
        } else {
            segment.to_owned()
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.classes.retain(|class| class != &off && class != &on);
            inner.classes.push(on);
        }
        self.refresh_root();
    }

    /// Re-write the serialized root at the mount address from current state.
    fn refresh_root(&self) {
        let (address, target) = {
            let inner = self.inner.borrow();
            (inner.address.clone(), inner.target.clone())
        };
        if let (Some(address), Some(target)) = (address, target) {
            target
                .borrow_mut()
                .replace(&address, &self.render_to_string());
        }
    }

    /// Materialize one directive child recorded during template evaluation.
    fn materialize(
        &self,
        pending: PendingChild,
        context: &Model,
        target: &SharedTarget,
        dispatcher: Option<&Dispatcher>,
    ) -> Result<(), ViewError> {
        match pending {
            PendingChild::Subview {
                address,
                path,
                template,
                config,
            } => {
                let sub_context = if path.is_empty() {
                    Some(context.clone())
                } else {
                    resolve(&path, &Value::Model(context.clone()))
                        .as_model()
                        .cloned()
                };
                // Unresolvable sub-context: nothing bound yet, skip quietly.
                let Some(sub_context) = sub_context else {
                    return Ok(());
                };
                let mut child =
                    View::from_template(&sub_context, template).with_tag(config.tag.as_str());
                if let Some(dom_id) = &config.dom_id {
                    child = child.with_dom_id(dom_id.clone());
                }
                if let Some(spec) = &config.class_binding {
                    child = child.with_class_binding(spec);
                }
                if let Some(dispatcher) = dispatcher {
                    child = child.with_dispatcher(dispatcher);
                }
                child.attach_parent(self);
                child.mount_shallow(target, &address)?;
                self.inner.borrow_mut().children.push(ChildNode::View(child));
                Ok(())
            }
            PendingChild::Collection {
                address,
                path,
                item_template,
                item_tag,
            } => {
                let resolved = resolve(&path, &Value::Model(context.clone()));
                let child = CollectionView::new(&resolved, item_template, &item_tag)
                    .map_err(|_| ViewError::NotACollection {
                        path: path.to_string(),
                    })?;
                if let Some(dispatcher) = dispatcher {
                    child.set_dispatcher(dispatcher);
                }
                child.container().attach_parent(self);
                child.mount_shallow(target, &address)?;
                self.inner
                    .borrow_mut()
                    .children
                    .push(ChildNode::Collection(child));
                Ok(())
            }
            PendingChild::Value { address, path } => {
                let child = View::bound_value(context, &path);
                child.attach_parent(self);
                child.mount_shallow(target, &address)?;
                self.inner.borrow_mut().children.push(ChildNode::View(child));
                Ok(())
            }
        }
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("View")
            .field("id", &inner.id)
            .field("tag", &inner.tag)
            .field("address", &inner.address)
            .field("children", &inner.children.len())
            .field("state", &inner.state)
            .finish()
    }
}
