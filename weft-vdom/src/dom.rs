use weft_store::{Slab, slab_index};

use crate::events::{Dispatch, Listener, Modifiers};

slab_index!(pub struct NodeId);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    attrs: Vec<(String, String)>,
    props: Vec<String>,
    listeners: Vec<Listener>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            parent: None,
            children: vec![],
            kind,
        }
    }
}

/// The live tree.
///
/// Nodes live in an arena and are addressed by [`NodeId`]; the patcher is
/// the only writer during renders. A mutation counter records every write
/// so tests can assert that a patch was a no-op.
#[derive(Debug)]
pub struct Document {
    nodes: Slab<NodeId, Node>,
    root: NodeId,
    mutations: u64,
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = Slab::empty();
        let root = nodes.insert(Node::new(NodeKind::Element(ElementData {
            tag: "#document".into(),
            attrs: vec![],
            props: vec![],
            listeners: vec![],
        })));
        Self {
            nodes,
            root,
            mutations: 0,
        }
    }

    /// The document root; a node is "in the document" when its parent
    /// chain reaches this node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Total number of tree/attribute writes since creation
    pub fn mutations(&self) -> u64 {
        self.mutations
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id).expect("node ids are never dangling")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id).expect("node ids are never dangling")
    }

    // -----------------------------------------------------------------------------
    //   - Creation -
    // -----------------------------------------------------------------------------
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.mutations += 1;
        self.nodes.insert(Node::new(NodeKind::Element(ElementData {
            tag: tag.into(),
            attrs: vec![],
            props: vec![],
            listeners: vec![],
        })))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.mutations += 1;
        self.nodes.insert(Node::new(NodeKind::Text(text.into())))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.mutations += 1;
        self.nodes.insert(Node::new(NodeKind::Comment(text.into())))
    }

    // -----------------------------------------------------------------------------
    //   - Tree structure -
    // -----------------------------------------------------------------------------
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent`, before `reference` (append when
    /// `reference` is `None`). Re-inserting an attached node moves it.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.mutations += 1;
        self.detach(child);
        self.node_mut(child).parent = Some(parent);

        let siblings = &mut self.node_mut(parent).children;
        let index = reference
            .and_then(|reference| siblings.iter().position(|id| *id == reference))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            let siblings = &mut self.node_mut(parent).children;
            siblings.retain(|child| *child != id);
            self.node_mut(id).parent = None;
        }
    }

    /// Detach a node and free its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        self.mutations += 1;
        self.detach(id);
        self.free(id);
    }

    fn free(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.free(child);
        }
        self.nodes.remove(id);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.node(id).parent?;
        let siblings = &self.node(parent).children;
        let index = siblings.iter().position(|child| *child == id)?;
        siblings.get(index + 1).copied()
    }

    pub fn is_in_document(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                break true;
            }
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => break false,
            }
        }
    }

    // -----------------------------------------------------------------------------
    //   - Node data -
    // -----------------------------------------------------------------------------
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element(data) => Some(&data.tag),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element(data) => data.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        self.mutations += 1;
        let name = name.into();
        if let NodeKind::Element(data) = &mut self.node_mut(id).kind {
            match data.attrs.iter_mut().find(|(n, _)| *n == name) {
                Some((_, slot)) => *slot = value.into(),
                None => data.attrs.push((name, value.into())),
            }
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        self.mutations += 1;
        if let NodeKind::Element(data) = &mut self.node_mut(id).kind {
            data.attrs.retain(|(n, _)| n != name);
        }
    }

    /// Boolean element properties (`checked`, `disabled`, ...) mirror
    /// truthy boolean attributes and are dropped on falsy ones.
    pub fn set_prop(&mut self, id: NodeId, name: impl Into<String>) {
        self.mutations += 1;
        let name = name.into();
        if let NodeKind::Element(data) = &mut self.node_mut(id).kind {
            if !data.props.contains(&name) {
                data.props.push(name);
            }
        }
    }

    pub fn remove_prop(&mut self, id: NodeId, name: &str) {
        self.mutations += 1;
        if let NodeKind::Element(data) = &mut self.node_mut(id).kind {
            data.props.retain(|n| n != name);
        }
    }

    pub fn has_prop(&self, id: NodeId, name: &str) -> bool {
        match &self.node(id).kind {
            NodeKind::Element(data) => data.props.iter().any(|n| n == name),
            _ => false,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        self.mutations += 1;
        match &mut self.node_mut(id).kind {
            NodeKind::Text(slot) | NodeKind::Comment(slot) => *slot = text.into(),
            NodeKind::Element(_) => {}
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn set_listeners(&mut self, id: NodeId, listeners: Vec<Listener>) {
        self.mutations += 1;
        if let NodeKind::Element(data) = &mut self.node_mut(id).kind {
            data.listeners = listeners;
        }
    }

    // -----------------------------------------------------------------------------
    //   - Events -
    // -----------------------------------------------------------------------------
    /// Dispatch an event at `target`, bubbling towards the root. Returns
    /// the callable descriptors of every listener that fired, in order.
    pub fn dispatch(&self, target: NodeId, event: &str) -> Dispatch {
        let mut out = Dispatch::default();
        let mut current = Some(target);

        while let Some(id) = current {
            if let NodeKind::Element(data) = &self.node(id).kind {
                let mut stop = false;
                for listener in &data.listeners {
                    if listener.event != event {
                        continue;
                    }
                    if listener.mods.contains(Modifiers::SELF_ONLY) && id != target {
                        continue;
                    }
                    if listener.mods.contains(Modifiers::PREVENT) {
                        out.default_prevented = true;
                    }
                    if listener.mods.contains(Modifiers::STOP) {
                        stop = true;
                    }
                    out.handlers.push(listener.handler.clone());
                }
                if stop {
                    break;
                }
            }
            current = self.node(id).parent;
        }

        out
    }

    // -----------------------------------------------------------------------------
    //   - Serialisation -
    // -----------------------------------------------------------------------------
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in &self.node(id).children {
            self.write_node(*child, &mut out);
        }
        out
    }

    /// The concatenated text of the subtree
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.node(id).kind {
            NodeKind::Text(text) => text.clone(),
            NodeKind::Comment(_) => String::new(),
            NodeKind::Element(_) => {
                let mut out = String::new();
                for child in &self.node(id).children {
                    out.push_str(&self.text_content(*child));
                }
                out
            }
        }
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element(data) => {
                out.push('<');
                out.push_str(&data.tag);
                for (name, value) in &data.attrs {
                    out.push(' ');
                    out.push_str(name);
                    if !value.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape_attr(value));
                        out.push('"');
                    }
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(&data.tag);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::HandlerRef;

    fn handler(name: &str) -> HandlerRef {
        HandlerRef {
            owner: 0,
            name: name.into(),
            args: vec![],
        }
    }

    fn listener(event: &str, name: &str, mods: Modifiers) -> Listener {
        Listener {
            event: event.into(),
            mods,
            handler: handler(name),
        }
    }

    #[test]
    fn build_and_serialise() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let text = doc.create_text("hello");
        doc.append(div, text);
        doc.set_attribute(div, "class", "greeting");
        doc.append(doc.root(), div);

        assert_eq!(doc.outer_html(div), r#"<div class="greeting">hello</div>"#);
        assert!(doc.is_in_document(text));
    }

    #[test]
    fn text_is_escaped_on_output() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let text = doc.create_text("<ok> & fine");
        doc.append(div, text);

        assert_eq!(doc.outer_html(div), "<div>&lt;ok&gt; &amp; fine</div>");
    }

    #[test]
    fn insert_before_positions_child() {
        let mut doc = Document::new();
        let ul = doc.create_element("ul");
        let a = doc.create_element("li");
        let b = doc.create_element("li");
        let c = doc.create_element("li");
        doc.append(ul, a);
        doc.append(ul, c);
        doc.insert_before(ul, b, Some(c));

        assert_eq!(doc.children(ul), [a, b, c]);

        // Re-inserting moves rather than duplicates
        doc.insert_before(ul, c, Some(a));
        assert_eq!(doc.children(ul), [c, a, b]);
    }

    #[test]
    fn remove_frees_subtree() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let span = doc.create_element("span");
        doc.append(div, span);
        doc.append(doc.root(), div);

        doc.remove(div);
        assert!(doc.children(doc.root()).is_empty());
    }

    #[test]
    fn detached_subtree_is_not_in_document() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let span = doc.create_element("span");
        doc.append(div, span);

        assert!(!doc.is_in_document(span));
        doc.append(doc.root(), div);
        assert!(doc.is_in_document(span));
    }

    #[test]
    fn dispatch_bubbles() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("button");
        doc.append(outer, inner);
        doc.set_listeners(outer, vec![listener("click", "outer", Modifiers::empty())]);
        doc.set_listeners(inner, vec![listener("click", "inner", Modifiers::empty())]);

        let dispatch = doc.dispatch(inner, "click");
        let names = dispatch.handlers.iter().map(|h| h.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["inner", "outer"]);
    }

    #[test]
    fn dispatch_stop_modifier() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("button");
        doc.append(outer, inner);
        doc.set_listeners(outer, vec![listener("click", "outer", Modifiers::empty())]);
        doc.set_listeners(inner, vec![listener("click", "inner", Modifiers::STOP)]);

        let dispatch = doc.dispatch(inner, "click");
        let names = dispatch.handlers.iter().map(|h| h.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["inner"]);
    }

    #[test]
    fn dispatch_self_modifier() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("button");
        doc.append(outer, inner);
        doc.set_listeners(outer, vec![listener("click", "outer", Modifiers::SELF_ONLY)]);

        assert!(doc.dispatch(inner, "click").handlers.is_empty());
        assert_eq!(doc.dispatch(outer, "click").handlers.len(), 1);
    }
}
