use std::collections::HashMap;

use bitflags::bitflags;
use tracing::trace;
use weft_state::{Value, ValueMap};
use weft_store::{Slab, SlabIndex, slab_index};
use weft_templates::{Context, Extra, QWeb, WidgetSpawn};
use weft_vdom::patch::{self, mount as mount_tree};
use weft_vdom::{Document, HandlerRef, Key, NoHooks, NodeId, VNode};

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::widget::{Widget, WidgetCtx};

slab_index!(pub struct WidgetId);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct WidgetFlags: u8 {
        /// `will_start` has run
        const STARTED = 1;
        /// At least one render produced a vnode tree for this widget
        const RENDERED = 1 << 1;
        /// The `mounted` hook fired for the current activation
        const MOUNTED = 1 << 2;
        const DESTROYED = 1 << 3;
    }
}

/// A reference bound by `t-ref`: a document node, or the child widget
/// when the directive sits on a `t-widget` node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ref {
    Node(NodeId),
    Widget(WidgetId),
}

/// Messages handled by [`App::flush`].
#[derive(Debug)]
pub enum AppMessage {
    Handler(HandlerRef),
}

/// Clonable sender feeding the runtime's message queue.
#[derive(Clone)]
pub struct Emitter(flume::Sender<AppMessage>);

impl Emitter {
    pub fn send(&self, message: AppMessage) {
        let _ = self.0.send(message);
    }
}

/// Template-position identity of a child widget, used to reuse the
/// instance across parent renders.
#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    position: u64,
    key: Option<Key>,
    name: String,
    occurrence: usize,
}

struct WidgetCell {
    /// Checked out while a hook runs
    widget: Option<Box<dyn Widget>>,
    template: String,
    handlers: Vec<String>,
    state: ValueMap,
    flags: WidgetFlags,
    parent: Option<WidgetId>,
    children: Vec<WidgetId>,
    fingerprint: Option<Fingerprint>,
    /// The owned vnode tree; only mount roots hold one
    vnode: Option<VNode>,
    el: Option<NodeId>,
    target: Option<NodeId>,
    refs: HashMap<String, Ref>,
}

#[derive(Default)]
struct PassOut {
    /// Every widget the pass rendered, pre-order, with the list-path of
    /// its root vnode
    widgets: Vec<(WidgetId, Vec<usize>)>,
    refs: Vec<(WidgetId, String, RefTarget)>,
    created: Vec<WidgetId>,
    dropped: Vec<WidgetId>,
}

enum RefTarget {
    Path(Vec<usize>),
    Widget(WidgetId),
}

/// The widget runtime.
///
/// Owns the document, the template environment, the widget arena and
/// the scheduling queues. Updates are cooperative: handlers and state
/// patches queue work, [`App::flush`] drains it in microtask order and
/// coalesces renders.
pub struct App {
    dom: Document,
    qweb: QWeb,
    factory: Factory,
    widgets: Slab<WidgetId, WidgetCell>,
    tx: flume::Sender<AppMessage>,
    rx: flume::Receiver<AppMessage>,
    render_queue: Vec<WidgetId>,
}

impl App {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            dom: Document::new(),
            qweb: QWeb::new(),
            factory: Factory::new(),
            widgets: Slab::empty(),
            tx,
            rx,
            render_queue: vec![],
        }
    }

    pub fn document(&self) -> &Document {
        &self.dom
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.dom
    }

    pub fn qweb(&self) -> &QWeb {
        &self.qweb
    }

    pub fn qweb_mut(&mut self) -> &mut QWeb {
        &mut self.qweb
    }

    /// The document root, the usual mount target
    pub fn root(&self) -> NodeId {
        self.dom.root()
    }

    pub fn emitter(&self) -> Emitter {
        Emitter(self.tx.clone())
    }

    /// Register a widget constructor for `t-widget` resolution.
    pub fn register<W, F>(&mut self, name: impl Into<String>, factory: F)
    where
        W: Widget,
        F: Fn() -> W + 'static,
    {
        self.factory.register(name, factory);
    }

    /// Put a widget instance under runtime control.
    pub fn create(&mut self, widget: impl Widget) -> WidgetId {
        self.create_boxed(Box::new(widget))
    }

    fn create_boxed(&mut self, widget: Box<dyn Widget>) -> WidgetId {
        let template = widget.template().to_string();
        let handlers = widget.handlers().iter().map(|name| name.to_string()).collect();
        let state = widget.initial_state();

        self.widgets.insert(WidgetCell {
            widget: Some(widget),
            template,
            handlers,
            state,
            flags: WidgetFlags::empty(),
            parent: None,
            children: vec![],
            fingerprint: None,
            vnode: None,
            el: None,
            target: None,
            refs: HashMap::new(),
        })
    }

    fn create_by_name(&mut self, name: &str) -> Result<WidgetId> {
        let widget = self
            .factory
            .create(name)
            .ok_or_else(|| Error::UnknownWidget(name.to_string()))?;
        Ok(self.create_boxed(widget))
    }

    // -----------------------------------------------------------------------------
    //   - Accessors -
    // -----------------------------------------------------------------------------
    pub fn state(&self, id: WidgetId) -> Option<&ValueMap> {
        self.widgets.get(id).map(|cell| &cell.state)
    }

    pub fn refs(&self, id: WidgetId) -> Option<&HashMap<String, Ref>> {
        self.widgets.get(id).map(|cell| &cell.refs)
    }

    pub fn el(&self, id: WidgetId) -> Option<NodeId> {
        self.widgets.get(id)?.el
    }

    pub fn children(&self, id: WidgetId) -> &[WidgetId] {
        self.widgets.get(id).map(|cell| cell.children.as_slice()).unwrap_or(&[])
    }

    pub fn is_mounted(&self, id: WidgetId) -> bool {
        self.widgets
            .get(id)
            .is_some_and(|cell| cell.flags.contains(WidgetFlags::MOUNTED))
    }

    pub fn is_destroyed(&self, id: WidgetId) -> bool {
        self.widgets
            .get(id)
            .is_none_or(|cell| cell.flags.contains(WidgetFlags::DESTROYED))
    }

    // -----------------------------------------------------------------------------
    //   - Mount -
    // -----------------------------------------------------------------------------
    /// Drive a widget through willStart → render → document insertion.
    /// `mounted` hooks fire bottom-up once the subtree is inside the
    /// document; mounting under a detached target defers them.
    pub fn mount(&mut self, id: WidgetId, target: NodeId) -> Result<()> {
        let Some(cell) = self.widgets.get(id) else {
            return Err(Error::Destroyed);
        };
        if cell.flags.contains(WidgetFlags::DESTROYED) {
            return Err(Error::Destroyed);
        }
        if cell.vnode.is_some() {
            // already mounted
            return Ok(());
        }

        trace!(widget = id.as_usize(), "mount");
        self.run_will_start(id)?;

        let mut pass = PassOut::default();
        let mut vnode = self.render_pass(id, vec![0], &mut pass)?;
        mount_tree(&mut self.dom, &mut NoHooks, target, &mut vnode);

        if let Some(cell) = self.widgets.get_mut(id) {
            cell.target = Some(target);
        }
        self.finalize(id, vnode, &pass);

        if self.dom.is_in_document(target) {
            self.run_mounted(&pass);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------------
    //   - Updates -
    // -----------------------------------------------------------------------------
    /// Merge a state patch and queue a render of the widget's mount
    /// root. Patches before the first render only merge; patches after
    /// destruction are dropped.
    pub fn update_state(&mut self, id: WidgetId, patch: ValueMap) {
        let Some(cell) = self.widgets.get_mut(id) else { return };
        if cell.flags.contains(WidgetFlags::DESTROYED) {
            return;
        }

        cell.state.merge(patch);

        if !cell.flags.contains(WidgetFlags::RENDERED) {
            return;
        }

        let root = self.root_of(id);
        if !self.render_queue.contains(&root) {
            self.render_queue.push(root);
        }
    }

    /// Queue the handlers a document event resolves to. Returns how
    /// many listeners fired; the handlers run on the next flush.
    pub fn trigger(&mut self, node: NodeId, event: &str) -> usize {
        let dispatch = self.dom.dispatch(node, event);
        let count = dispatch.handlers.len();
        for handler in dispatch.handlers {
            let _ = self.tx.send(AppMessage::Handler(handler));
        }
        count
    }

    /// Drain queued handlers and coalesced renders until quiescent,
    /// the microtask boundary of the runtime.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            let mut progressed = false;

            while let Ok(AppMessage::Handler(handler)) = self.rx.try_recv() {
                progressed = true;
                self.invoke_handler(handler);
            }

            let pending = std::mem::take(&mut self.render_queue);
            for id in pending {
                progressed = true;
                self.render_root(id)?;
            }

            if !progressed {
                break;
            }
        }
        Ok(())
    }

    fn invoke_handler(&mut self, handler: HandlerRef) {
        // owner scopes are offset by one; zero means context-only renders
        let Some(owner) = handler.owner.checked_sub(1) else { return };
        let id = WidgetId::from_usize(owner as usize);

        let destroyed = self
            .widgets
            .get(id)
            .map(|cell| cell.flags.contains(WidgetFlags::DESTROYED));
        if destroyed != Some(false) {
            return;
        }

        let Some(mut widget) = self.take_widget(id) else { return };
        let mut ctx = WidgetCtx { app: self, id };
        widget.on_event(&handler.name, &handler.args, &mut ctx);
        self.put_widget(id, widget);
    }

    // -----------------------------------------------------------------------------
    //   - Render -
    // -----------------------------------------------------------------------------
    fn render_root(&mut self, id: WidgetId) -> Result<()> {
        let Some(cell) = self.widgets.get(id) else { return Ok(()) };
        // a destroyed widget's pending render is a no-op
        if cell.flags.contains(WidgetFlags::DESTROYED) || cell.vnode.is_none() {
            return Ok(());
        }
        let target_in_doc = cell.target.is_some_and(|target| self.dom.is_in_document(target));

        trace!(widget = id.as_usize(), "render");
        let mut pass = PassOut::default();
        let mut new_vnode = self.render_pass(id, vec![0], &mut pass)?;

        // dropped children leave the document with this patch
        for dropped in pass.dropped.clone() {
            self.call_will_unmount_tree(dropped);
        }

        let kept: Vec<WidgetId> = pass
            .widgets
            .iter()
            .map(|(wid, _)| *wid)
            .filter(|wid| !pass.created.contains(wid))
            .collect();
        for wid in &kept {
            self.call_hook(*wid, Hook::WillPatch);
        }

        let Some(old) = self.widgets.get_mut(id).and_then(|cell| cell.vnode.take()) else {
            return Ok(());
        };
        patch::patch(&mut self.dom, &mut NoHooks, old, &mut new_vnode);

        self.finalize(id, new_vnode, &pass);

        for dropped in pass.dropped.clone() {
            self.teardown_tree(dropped, false);
        }

        for wid in kept.iter().rev() {
            self.call_hook(*wid, Hook::Patched);
        }

        if target_in_doc {
            self.run_mounted(&pass);
        }
        Ok(())
    }

    /// Render one widget and, recursively, its sub-widgets, grafting
    /// their trees over the placeholder nodes. Every `will_start` in the
    /// subtree runs here, before any document mutation.
    fn render_pass(&mut self, id: WidgetId, base_path: Vec<usize>, out: &mut PassOut) -> Result<VNode> {
        let (template, state, handler_names, prev_children) = {
            let cell = self.widgets.get(id).ok_or(Error::Destroyed)?;
            (
                cell.template.clone(),
                cell.state.clone(),
                cell.handlers.clone(),
                cell.children.clone(),
            )
        };

        let mut ctx = Context::new().with_owner(id.as_usize() as u64 + 1);
        ctx.values.insert("state", Value::Map(state));
        for name in &handler_names {
            ctx.handlers.insert(name.clone());
        }

        let mut extra = Extra::new();
        let mut vnode = self.qweb.render(&template, &ctx, &mut extra)?;

        out.widgets.push((id, base_path.clone()));
        if let Some(cell) = self.widgets.get_mut(id) {
            cell.flags.insert(WidgetFlags::RENDERED);
        }

        for binding in extra.refs {
            out.refs
                .push((id, binding.name, RefTarget::Path(abs_path(&base_path, &binding.path))));
        }

        let mut used = vec![false; prev_children.len()];
        let mut new_children = vec![];
        let mut occurrences: HashMap<(u64, Option<Key>, String), usize> = HashMap::new();

        for spawn in extra.widgets {
            let child_id = self.resolve_child(id, &spawn, &prev_children, &mut used, &mut occurrences, out)?;
            new_children.push(child_id);

            let child_base = abs_path(&base_path, &spawn.path);
            let child_vnode = self.render_pass(child_id, child_base, out)?;
            graft(&mut vnode, &spawn.path, child_vnode);

            if let Some(ref_name) = spawn.ref_name {
                out.refs.push((id, ref_name, RefTarget::Widget(child_id)));
            }
        }

        for (index, child) in prev_children.iter().enumerate() {
            if !used[index] {
                out.dropped.push(*child);
            }
        }

        if let Some(cell) = self.widgets.get_mut(id) {
            cell.children = new_children;
        }

        Ok(vnode)
    }

    fn resolve_child(
        &mut self,
        parent: WidgetId,
        spawn: &WidgetSpawn,
        prev_children: &[WidgetId],
        used: &mut [bool],
        occurrences: &mut HashMap<(u64, Option<Key>, String), usize>,
        out: &mut PassOut,
    ) -> Result<WidgetId> {
        let occurrence = occurrences
            .entry((spawn.position, spawn.key.clone(), spawn.name.clone()))
            .or_insert(0);
        let fingerprint = Fingerprint {
            position: spawn.position,
            key: spawn.key.clone(),
            name: spawn.name.clone(),
            occurrence: *occurrence,
        };
        *occurrence += 1;

        let reuse = prev_children.iter().enumerate().find_map(|(index, child)| {
            let matches = !used[index]
                && self.widgets.get(*child).is_some_and(|cell| {
                    !cell.flags.contains(WidgetFlags::DESTROYED) && cell.fingerprint.as_ref() == Some(&fingerprint)
                });
            matches.then_some((index, *child))
        });

        match reuse {
            Some((index, child)) => {
                used[index] = true;
                Ok(child)
            }
            None => {
                let child = self.create_by_name(&spawn.name)?;
                if let Some(cell) = self.widgets.get_mut(child) {
                    cell.fingerprint = Some(fingerprint);
                    cell.parent = Some(parent);
                }
                self.run_will_start(child)?;
                out.created.push(child);
                Ok(child)
            }
        }
    }

    /// Store the patched tree, assign each widget its root element and
    /// rebuild ref tables.
    fn finalize(&mut self, root: WidgetId, vnode: VNode, pass: &PassOut) {
        for (wid, base) in &pass.widgets {
            let el = node_at(&vnode, base).and_then(VNode::elm);
            if let Some(cell) = self.widgets.get_mut(*wid) {
                cell.el = el;
                cell.refs.clear();
            }
        }

        for (owner, name, target) in &pass.refs {
            let value = match target {
                RefTarget::Path(path) => node_at(&vnode, path).and_then(VNode::elm).map(Ref::Node),
                RefTarget::Widget(wid) => Some(Ref::Widget(*wid)),
            };
            if let (Some(cell), Some(value)) = (self.widgets.get_mut(*owner), value) {
                cell.refs.insert(name.clone(), value);
            }
        }

        if let Some(cell) = self.widgets.get_mut(root) {
            cell.vnode = Some(vnode);
        }
    }

    /// `mounted` runs bottom-up over a snapshot of the pass: children
    /// before parents, and widgets mounted *by* a hook drive their own
    /// lifecycle without being revisited here.
    fn run_mounted(&mut self, pass: &PassOut) {
        let snapshot: Vec<WidgetId> = pass.widgets.iter().map(|(wid, _)| *wid).rev().collect();
        for id in snapshot {
            let ready = self.widgets.get(id).is_some_and(|cell| {
                !cell.flags.contains(WidgetFlags::DESTROYED)
                    && !cell.flags.contains(WidgetFlags::MOUNTED)
                    && cell.el.is_some_and(|el| self.dom.is_in_document(el))
            });
            if !ready {
                continue;
            }
            if let Some(cell) = self.widgets.get_mut(id) {
                cell.flags.insert(WidgetFlags::MOUNTED);
            }
            self.call_hook(id, Hook::Mounted);
        }
    }

    // -----------------------------------------------------------------------------
    //   - Destroy -
    // -----------------------------------------------------------------------------
    /// Tear a widget down: hooks fire while the document is still
    /// attached, children are destroyed before their parent, refs and
    /// elements clear, and a second call is a no-op.
    pub fn destroy(&mut self, id: WidgetId) {
        let Some(cell) = self.widgets.get(id) else { return };
        if cell.flags.contains(WidgetFlags::DESTROYED) {
            return;
        }

        trace!(widget = id.as_usize(), "destroy");
        self.call_will_unmount_tree(id);
        self.teardown_tree(id, true);
    }

    fn call_will_unmount_tree(&mut self, id: WidgetId) {
        let mounted = self
            .widgets
            .get(id)
            .is_some_and(|cell| cell.flags.contains(WidgetFlags::MOUNTED));
        if mounted {
            self.call_hook(id, Hook::WillUnmount);
        }

        let children = self.widgets.get(id).map(|cell| cell.children.clone()).unwrap_or_default();
        for child in children {
            self.call_will_unmount_tree(child);
        }
    }

    fn teardown_tree(&mut self, id: WidgetId, remove_dom: bool) {
        let Some(cell) = self.widgets.get_mut(id) else { return };
        if cell.flags.contains(WidgetFlags::DESTROYED) {
            return;
        }

        let children = std::mem::take(&mut cell.children);
        for child in children {
            self.teardown_tree(child, false);
        }

        let Some(cell) = self.widgets.get_mut(id) else { return };
        let vnode = cell.vnode.take();
        let el = cell.el.take();
        cell.refs.clear();
        cell.flags.insert(WidgetFlags::DESTROYED);

        if remove_dom {
            if let Some(vnode) = vnode {
                patch::remove(&mut self.dom, &mut NoHooks, vnode);
            } else if let Some(el) = el {
                self.dom.remove(el);
            }
        }

        self.render_queue.retain(|queued| *queued != id);
    }

    // -----------------------------------------------------------------------------
    //   - Hook plumbing -
    // -----------------------------------------------------------------------------
    fn take_widget(&mut self, id: WidgetId) -> Option<Box<dyn Widget>> {
        self.widgets.get_mut(id)?.widget.take()
    }

    fn put_widget(&mut self, id: WidgetId, widget: Box<dyn Widget>) {
        if let Some(cell) = self.widgets.get_mut(id) {
            cell.widget = Some(widget);
        }
    }

    fn run_will_start(&mut self, id: WidgetId) -> Result<()> {
        let started = self
            .widgets
            .get(id)
            .is_some_and(|cell| cell.flags.contains(WidgetFlags::STARTED));
        if started {
            return Ok(());
        }

        let Some(mut widget) = self.take_widget(id) else { return Ok(()) };
        let mut ctx = WidgetCtx { app: self, id };
        let result = widget.will_start(&mut ctx);
        self.put_widget(id, widget);

        if let Some(cell) = self.widgets.get_mut(id) {
            cell.flags.insert(WidgetFlags::STARTED);
        }
        result
    }

    fn call_hook(&mut self, id: WidgetId, hook: Hook) {
        let Some(mut widget) = self.take_widget(id) else { return };
        let mut ctx = WidgetCtx { app: self, id };
        match hook {
            Hook::Mounted => widget.mounted(&mut ctx),
            Hook::WillPatch => widget.will_patch(&mut ctx),
            Hook::Patched => widget.patched(&mut ctx),
            Hook::WillUnmount => widget.will_unmount(&mut ctx),
        }
        self.put_widget(id, widget);
    }

    fn root_of(&self, id: WidgetId) -> WidgetId {
        let mut current = id;
        while let Some(parent) = self.widgets.get(current).and_then(|cell| cell.parent) {
            current = parent;
        }
        current
    }
}

enum Hook {
    Mounted,
    WillPatch,
    Patched,
    WillUnmount,
}

// -----------------------------------------------------------------------------
//   - Vnode paths -
// -----------------------------------------------------------------------------
// Paths are "list paths": the first element indexes the root list a
// template renders (always 0, the single root), the rest walk children.

fn abs_path(base: &[usize], rel: &[usize]) -> Vec<usize> {
    base.iter().chain(rel.iter().skip(1)).copied().collect()
}

fn node_at<'v>(root: &'v VNode, path: &[usize]) -> Option<&'v VNode> {
    let mut node = root;
    for index in path.iter().skip(1) {
        let VNode::Element(el) = node else { return None };
        node = el.children.get(*index)?;
    }
    Some(node)
}

fn graft(root: &mut VNode, path: &[usize], replacement: VNode) {
    if path.len() <= 1 {
        *root = replacement;
        return;
    }

    let mut node = root;
    for index in &path[1..path.len() - 1] {
        let VNode::Element(el) = node else { return };
        let Some(child) = el.children.get_mut(*index) else { return };
        node = child;
    }

    let VNode::Element(el) = node else { return };
    if let Some(slot) = el.children.get_mut(path[path.len() - 1]) {
        *slot = replacement;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_arithmetic() {
        assert_eq!(abs_path(&[0], &[0, 2]), [0, 2]);
        assert_eq!(abs_path(&[0, 2], &[0, 1, 3]), [0, 2, 1, 3]);
    }

    #[test]
    fn graft_replaces_nested_nodes() {
        let mut root = VNode::fragment(vec![]);
        if let VNode::Element(el) = &mut root {
            el.children.push(VNode::text("a"));
            el.children.push(VNode::comment("placeholder"));
        }

        graft(&mut root, &[0, 1], VNode::text("b"));
        let VNode::Element(el) = &root else { unreachable!() };
        assert_eq!(el.children[1], VNode::text("b"));
    }

    #[test]
    fn graft_at_root() {
        let mut root = VNode::comment("placeholder");
        graft(&mut root, &[0], VNode::text("x"));
        assert_eq!(root, VNode::text("x"));
    }
}
