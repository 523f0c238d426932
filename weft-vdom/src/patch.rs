use std::collections::HashMap;

use crate::dom::{Document, NodeId};
use crate::node::{AttrValue, Attributes, Key, VElement, VNode, is_bool_attr};

/// Completion handle passed to the `remove` hook. Detachment only happens
/// once the handle completes, which lets transition glue delay it.
pub struct RemoveHandle {
    node: NodeId,
}

impl RemoveHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn complete(self, doc: &mut Document) {
        doc.remove(self.node);
    }
}

/// Module hooks invoked by the patcher at defined points.
///
/// `insert` only fires for subtrees attached to the live document;
/// `remove` receives a [`RemoveHandle`] and detaches on completion.
pub trait PatchHooks {
    fn create(&mut self, _doc: &mut Document, _el: &VElement) {}

    fn insert(&mut self, _doc: &mut Document, _el: &VElement) {}

    fn prepatch(&mut self, _doc: &mut Document, _old: &VElement, _new: &VElement) {}

    fn update(&mut self, _doc: &mut Document, _old: &VElement, _new: &VElement) {}

    fn postpatch(&mut self, _doc: &mut Document, _old: &VElement, _new: &VElement) {}

    fn remove(&mut self, doc: &mut Document, _el: &VElement, done: RemoveHandle) {
        done.complete(doc);
    }

    fn destroy(&mut self, _doc: &mut Document, _el: &VElement) {}
}

pub struct NoHooks;

impl PatchHooks for NoHooks {}

/// Create the vnode tree and append it under `target`.
pub fn mount(doc: &mut Document, hooks: &mut dyn PatchHooks, target: NodeId, vnode: &mut VNode) {
    let elm = create_node(doc, hooks, vnode);
    doc.append(target, elm);
    if doc.is_in_document(elm) {
        fire_inserted(doc, hooks, vnode);
    }
}

/// Reconcile `old` against `new`, applying the delta to the document.
/// `new` has its `elm` slots filled in as nodes are matched or created.
pub fn patch(doc: &mut Document, hooks: &mut dyn PatchHooks, old: VNode, new: &mut VNode) {
    if old.same_node(new) {
        patch_same(doc, hooks, old, new);
    } else {
        replace(doc, hooks, old, new);
    }
}

/// Run destroy hooks over the subtree, then detach it through the
/// `remove` hook.
pub fn remove(doc: &mut Document, hooks: &mut dyn PatchHooks, vnode: VNode) {
    fire_destroyed(doc, hooks, &vnode);
    match vnode {
        VNode::Element(el) => {
            let Some(elm) = el.elm else { return };
            if let Some(transition) = &el.transition {
                append_class(doc, elm, &format!("{transition}-leave"));
            }
            hooks.remove(doc, &el, RemoveHandle { node: elm });
        }
        other => {
            if let Some(elm) = other.elm() {
                doc.remove(elm);
            }
        }
    }
}

fn patch_same(doc: &mut Document, hooks: &mut dyn PatchHooks, old: VNode, new: &mut VNode) {
    match (old, new) {
        (VNode::Text(old), VNode::Text(new)) => {
            new.elm = old.elm;
            if old.text != new.text {
                if let Some(elm) = new.elm {
                    doc.set_text(elm, &new.text);
                }
            }
        }
        (VNode::Comment(old), VNode::Comment(new)) => {
            new.elm = old.elm;
            if old.text != new.text {
                if let Some(elm) = new.elm {
                    doc.set_text(elm, &new.text);
                }
            }
        }
        (VNode::Element(old), VNode::Element(new)) => patch_element(doc, hooks, old, new),
        // `same_node` held, so the kinds cannot diverge
        _ => unreachable!("patch_same called on mismatched vnodes"),
    }
}

fn patch_element(doc: &mut Document, hooks: &mut dyn PatchHooks, mut old: VElement, new: &mut VElement) {
    let elm = old.elm.expect("an element being patched was created before");
    new.elm = Some(elm);

    hooks.prepatch(doc, &old, new);

    update_attrs(doc, elm, &old.attrs, &new.attrs);
    if old.listeners != new.listeners {
        doc.set_listeners(elm, new.listeners.clone());
    }

    hooks.update(doc, &old, new);

    let old_children = std::mem::take(&mut old.children);
    update_children(doc, hooks, elm, old_children, &mut new.children);

    hooks.postpatch(doc, &old, new);
}

fn update_attrs(doc: &mut Document, elm: NodeId, old: &Attributes, new: &Attributes) {
    for (name, value) in new.iter() {
        if old.get(name) != Some(value) {
            set_attr(doc, elm, name, value);
        }
    }
    for (name, _) in old.iter() {
        if new.get(name).is_none() {
            doc.remove_attribute(elm, name);
            if is_bool_attr(name) {
                doc.remove_prop(elm, name);
            }
        }
    }
}

fn set_attr(doc: &mut Document, elm: NodeId, name: &str, value: &AttrValue) {
    match value {
        AttrValue::Text(value) => doc.set_attribute(elm, name, value),
        AttrValue::Flag => {
            doc.set_attribute(elm, name, "");
            if is_bool_attr(name) {
                doc.set_prop(elm, name);
            }
        }
    }
}

fn update_children(doc: &mut Document, hooks: &mut dyn PatchHooks, parent: NodeId, old: Vec<VNode>, new: &mut [VNode]) {
    if old.is_empty() && new.is_empty() {
        return;
    }
    // The keyed walk requires a key on every sibling on both sides;
    // otherwise reconciliation is index-aligned and nothing moves.
    if all_keyed(&old) && all_keyed(new) {
        update_keyed(doc, hooks, parent, old, new);
    } else {
        update_indexed(doc, hooks, parent, old, new);
    }
}

fn all_keyed(children: &[VNode]) -> bool {
    !children.is_empty()
        && children
            .iter()
            .all(|child| matches!(child, VNode::Element(el) if el.key.is_some()))
}

fn update_indexed(doc: &mut Document, hooks: &mut dyn PatchHooks, parent: NodeId, old: Vec<VNode>, new: &mut [VNode]) {
    let shared = old.len().min(new.len());
    let mut old_iter = old.into_iter();

    for new_child in new.iter_mut().take(shared) {
        let old_child = old_iter.next().expect("length checked above");
        if old_child.same_node(new_child) {
            patch_same(doc, hooks, old_child, new_child);
        } else {
            replace(doc, hooks, old_child, new_child);
        }
    }

    for old_child in old_iter {
        remove(doc, hooks, old_child);
    }

    for new_child in new.iter_mut().skip(shared) {
        let elm = create_node(doc, hooks, new_child);
        doc.append(parent, elm);
        if doc.is_in_document(elm) {
            fire_inserted(doc, hooks, new_child);
        }
    }
}

enum Step {
    PatchStart,
    PatchEnd,
    MoveRight { anchor: Option<NodeId> },
    MoveLeft { anchor: Option<NodeId> },
    Fetch { anchor: Option<NodeId> },
}

// Two-pointer walk over both children lists, falling back to a key map
// for moves. Old entries are taken out of their slots as they match so
// document nodes keep their identity per key.
fn update_keyed(doc: &mut Document, hooks: &mut dyn PatchHooks, parent: NodeId, old: Vec<VNode>, new: &mut [VNode]) {
    let mut old: Vec<Option<VNode>> = old.into_iter().map(Some).collect();
    let mut key_map: Option<HashMap<Key, usize>> = None;

    let mut os: isize = 0;
    let mut oe: isize = old.len() as isize - 1;
    let mut ns: isize = 0;
    let mut ne: isize = new.len() as isize - 1;

    while os <= oe && ns <= ne {
        let step = {
            let Some(old_start) = &old[os as usize] else {
                os += 1;
                continue;
            };
            let Some(old_end) = &old[oe as usize] else {
                oe -= 1;
                continue;
            };

            if old_start.same_node(&new[ns as usize]) {
                Step::PatchStart
            } else if old_end.same_node(&new[ne as usize]) {
                Step::PatchEnd
            } else if old_start.same_node(&new[ne as usize]) {
                Step::MoveRight {
                    anchor: old_end.elm().and_then(|elm| doc.next_sibling(elm)),
                }
            } else if old_end.same_node(&new[ns as usize]) {
                Step::MoveLeft {
                    anchor: old_start.elm(),
                }
            } else {
                Step::Fetch {
                    anchor: old_start.elm(),
                }
            }
        };

        match step {
            Step::PatchStart => {
                let old_node = old[os as usize].take().expect("present in step selection");
                patch_same(doc, hooks, old_node, &mut new[ns as usize]);
                os += 1;
                ns += 1;
            }
            Step::PatchEnd => {
                let old_node = old[oe as usize].take().expect("present in step selection");
                patch_same(doc, hooks, old_node, &mut new[ne as usize]);
                oe -= 1;
                ne -= 1;
            }
            Step::MoveRight { anchor } => {
                let old_node = old[os as usize].take().expect("present in step selection");
                patch_same(doc, hooks, old_node, &mut new[ne as usize]);
                if let Some(elm) = new[ne as usize].elm() {
                    doc.insert_before(parent, elm, anchor);
                }
                os += 1;
                ne -= 1;
            }
            Step::MoveLeft { anchor } => {
                let old_node = old[oe as usize].take().expect("present in step selection");
                patch_same(doc, hooks, old_node, &mut new[ns as usize]);
                if let Some(elm) = new[ns as usize].elm() {
                    doc.insert_before(parent, elm, anchor);
                }
                oe -= 1;
                ns += 1;
            }
            Step::Fetch { anchor } => {
                let map = key_map.get_or_insert_with(|| {
                    let mut map = HashMap::new();
                    for (index, node) in old.iter().enumerate() {
                        if let Some(VNode::Element(el)) = node {
                            if let Some(key) = &el.key {
                                map.insert(key.clone(), index);
                            }
                        }
                    }
                    map
                });

                let matched = key_of(&new[ns as usize])
                    .and_then(|key| map.get(key).copied())
                    .filter(|index| {
                        old[*index]
                            .as_ref()
                            .is_some_and(|node| node.same_node(&new[ns as usize]))
                    });

                match matched {
                    Some(index) => {
                        let old_node = old[index].take().expect("match guaranteed occupancy");
                        patch_same(doc, hooks, old_node, &mut new[ns as usize]);
                        if let Some(elm) = new[ns as usize].elm() {
                            doc.insert_before(parent, elm, anchor);
                        }
                    }
                    None => {
                        let elm = create_node(doc, hooks, &mut new[ns as usize]);
                        doc.insert_before(parent, elm, anchor);
                        if doc.is_in_document(elm) {
                            fire_inserted(doc, hooks, &new[ns as usize]);
                        }
                    }
                }
                ns += 1;
            }
        }
    }

    if os > oe {
        // Everything left in `new` is an addition, anchored before the
        // first already-patched trailing sibling.
        let anchor = usize::try_from(ne + 1)
            .ok()
            .and_then(|index| new.get(index))
            .and_then(VNode::elm);
        let mut index = ns;
        while index <= ne {
            let elm = create_node(doc, hooks, &mut new[index as usize]);
            doc.insert_before(parent, elm, anchor);
            if doc.is_in_document(elm) {
                fire_inserted(doc, hooks, &new[index as usize]);
            }
            index += 1;
        }
    } else if ns > ne {
        let mut index = os;
        while index <= oe {
            if let Some(old_node) = old[index as usize].take() {
                remove(doc, hooks, old_node);
            }
            index += 1;
        }
    }
}

fn key_of(vnode: &VNode) -> Option<&Key> {
    match vnode {
        VNode::Element(el) => el.key.as_ref(),
        _ => None,
    }
}

fn replace(doc: &mut Document, hooks: &mut dyn PatchHooks, old: VNode, new: &mut VNode) {
    let old_elm = old.elm().expect("a replaced vnode was created before");
    let parent = doc.parent(old_elm);
    let elm = create_node(doc, hooks, new);
    if let Some(parent) = parent {
        doc.insert_before(parent, elm, Some(old_elm));
    }
    remove(doc, hooks, old);
    if doc.is_in_document(elm) {
        fire_inserted(doc, hooks, new);
    }
}

pub(crate) fn create_node(doc: &mut Document, hooks: &mut dyn PatchHooks, vnode: &mut VNode) -> NodeId {
    match vnode {
        VNode::Text(text) => {
            let elm = doc.create_text(&text.text);
            text.elm = Some(elm);
            elm
        }
        VNode::Comment(comment) => {
            let elm = doc.create_comment(&comment.text);
            comment.elm = Some(elm);
            elm
        }
        VNode::Element(el) => {
            let elm = doc.create_element(&el.sel);
            for (name, value) in el.attrs.iter() {
                set_attr(doc, elm, name, value);
            }
            if let Some(transition) = &el.transition {
                append_class(doc, elm, &format!("{transition}-enter"));
            }
            if !el.listeners.is_empty() {
                doc.set_listeners(elm, el.listeners.clone());
            }
            for child in &mut el.children {
                let child_elm = create_node(doc, hooks, child);
                doc.append(elm, child_elm);
            }
            el.elm = Some(elm);
            hooks.create(doc, el);
            elm
        }
    }
}

fn fire_inserted(doc: &mut Document, hooks: &mut dyn PatchHooks, vnode: &VNode) {
    if let VNode::Element(el) = vnode {
        for child in &el.children {
            fire_inserted(doc, hooks, child);
        }
        hooks.insert(doc, el);
    }
}

fn fire_destroyed(doc: &mut Document, hooks: &mut dyn PatchHooks, vnode: &VNode) {
    if let VNode::Element(el) = vnode {
        hooks.destroy(doc, el);
        for child in &el.children {
            fire_destroyed(doc, hooks, child);
        }
    }
}

fn append_class(doc: &mut Document, elm: NodeId, class: &str) {
    let merged = match doc.attribute(elm, "class") {
        Some(existing) if !existing.is_empty() => format!("{existing} {class}"),
        _ => class.to_string(),
    };
    doc.set_attribute(elm, "class", merged);
}

#[cfg(test)]
mod test {
    use super::*;

    fn keyed_list(keys: &[i64]) -> VNode {
        let mut ul = element("ul");
        for key in keys {
            let mut li = element("li");
            li.key = Some(Key::Int(*key));
            li.children.push(VNode::text(key.to_string()));
            ul.children.push(VNode::Element(li));
        }
        VNode::Element(ul)
    }

    fn element(sel: &str) -> VElement {
        let VNode::Element(el) = VNode::element(sel) else { unreachable!() };
        el
    }

    fn mounted(doc: &mut Document, vnode: &mut VNode) {
        let root = doc.root();
        mount(doc, &mut NoHooks, root, vnode);
    }

    #[test]
    fn mount_builds_the_tree() {
        let mut doc = Document::new();
        let mut el = element("div");
        el.attrs.set_text("class", "hello");
        el.children.push(VNode::text("hi"));
        let mut vnode = VNode::Element(el);

        mounted(&mut doc, &mut vnode);

        assert_eq!(doc.inner_html(doc.root()), r#"<div class="hello">hi</div>"#);
        assert!(vnode.elm().is_some());
    }

    #[test]
    fn patch_updates_attributes() {
        let mut doc = Document::new();
        let mut old_el = element("div");
        old_el.attrs.set_text("class", "a");
        old_el.attrs.set_text("title", "x");
        let mut old = VNode::Element(old_el);
        mounted(&mut doc, &mut old);

        let mut new_el = element("div");
        new_el.attrs.set_text("class", "b");
        let mut new = VNode::Element(new_el);
        patch(&mut doc, &mut NoHooks, old, &mut new);

        assert_eq!(doc.inner_html(doc.root()), r#"<div class="b"></div>"#);
    }

    #[test]
    fn patch_identical_tree_is_a_noop() {
        let mut doc = Document::new();
        let mut el = element("div");
        el.attrs.set_text("class", "a");
        el.children.push(VNode::text("hi"));
        let mut old = VNode::Element(el);
        mounted(&mut doc, &mut old);

        let mut new = old.clone();
        // clear the elm slots as a fresh render would produce them
        if let VNode::Element(el) = &mut new {
            el.elm = None;
            for child in &mut el.children {
                if let VNode::Text(text) = child {
                    text.elm = None;
                }
            }
        }

        let before = doc.mutations();
        patch(&mut doc, &mut NoHooks, old, &mut new);
        assert_eq!(doc.mutations(), before);
    }

    #[test]
    fn mismatched_selector_replaces_the_node() {
        let mut doc = Document::new();
        let mut old = VNode::Element(element("div"));
        mounted(&mut doc, &mut old);
        let old_elm = old.elm().expect("mounted");

        let mut new = VNode::Element(element("span"));
        patch(&mut doc, &mut NoHooks, old, &mut new);

        assert_eq!(doc.inner_html(doc.root()), "<span></span>");
        assert_ne!(new.elm(), Some(old_elm));
    }

    #[test]
    fn text_patch_updates_in_place() {
        let mut doc = Document::new();
        let mut old = VNode::Element(element("div"));
        if let VNode::Element(el) = &mut old {
            el.children.push(VNode::text("a"));
        }
        mounted(&mut doc, &mut old);

        let mut new = VNode::Element(element("div"));
        if let VNode::Element(el) = &mut new {
            el.children.push(VNode::text("b"));
        }
        patch(&mut doc, &mut NoHooks, old, &mut new);

        assert_eq!(doc.inner_html(doc.root()), "<div>b</div>");
    }

    #[test]
    fn keyed_permutation_preserves_node_identity() {
        let mut doc = Document::new();
        let mut old = keyed_list(&[1, 2, 3, 4]);
        mounted(&mut doc, &mut old);

        // remember which document node carries which key
        let ul = old.elm().expect("mounted");
        let before: Vec<NodeId> = doc.children(ul).to_vec();

        let mut new = keyed_list(&[4, 2, 1, 3]);
        patch(&mut doc, &mut NoHooks, old, &mut new);

        let after: Vec<NodeId> = doc.children(ul).to_vec();
        // 1-based keys map to 0-based original positions
        assert_eq!(after, [before[3], before[1], before[0], before[2]]);
        assert_eq!(doc.text_content(ul), "4213");
    }

    #[test]
    fn keyed_additions_and_removals() {
        let mut doc = Document::new();
        let mut old = keyed_list(&[1, 2, 3]);
        mounted(&mut doc, &mut old);
        let ul = old.elm().expect("mounted");
        let keep = doc.children(ul)[2];

        let mut new = keyed_list(&[3, 5]);
        patch(&mut doc, &mut NoHooks, old, &mut new);

        assert_eq!(doc.text_content(ul), "35");
        assert_eq!(doc.children(ul)[0], keep);
    }

    #[test]
    fn unkeyed_children_reconcile_by_index() {
        let mut doc = Document::new();
        let mut old = VNode::Element(element("div"));
        if let VNode::Element(el) = &mut old {
            el.children.push(VNode::Element(element("span")));
            el.children.push(VNode::text("x"));
        }
        mounted(&mut doc, &mut old);

        let mut new = VNode::Element(element("div"));
        if let VNode::Element(el) = &mut new {
            el.children.push(VNode::Element(element("b")));
            el.children.push(VNode::text("y"));
            el.children.push(VNode::text("z"));
        }
        patch(&mut doc, &mut NoHooks, old, &mut new);

        assert_eq!(doc.inner_html(doc.root()), "<div><b></b>yz</div>");
    }

    #[test]
    fn boolean_attributes_set_prop_and_attr() {
        let mut doc = Document::new();
        let mut el = element("input");
        el.attrs.set("checked", AttrValue::Flag);
        let mut old = VNode::Element(el);
        mounted(&mut doc, &mut old);
        let input = old.elm().expect("mounted");

        assert!(doc.has_prop(input, "checked"));
        assert_eq!(doc.attribute(input, "checked"), Some(""));

        let mut new = VNode::Element(element("input"));
        patch(&mut doc, &mut NoHooks, old, &mut new);
        assert!(!doc.has_prop(input, "checked"));
        assert_eq!(doc.attribute(input, "checked"), None);
    }

    #[test]
    fn transition_classes_on_enter() {
        let mut doc = Document::new();
        let mut el = element("div");
        el.transition = Some("fade".into());
        let mut vnode = VNode::Element(el);
        mounted(&mut doc, &mut vnode);

        let elm = vnode.elm().expect("mounted");
        assert_eq!(doc.attribute(elm, "class"), Some("fade-enter"));
    }

    #[test]
    fn insert_hook_only_fires_in_document() {
        struct Counter(usize);
        impl PatchHooks for Counter {
            fn insert(&mut self, _doc: &mut Document, _el: &VElement) {
                self.0 += 1;
            }
        }

        let mut doc = Document::new();
        let detached = doc.create_element("div");

        let mut hooks = Counter(0);
        let mut vnode = VNode::Element(element("span"));
        mount(&mut doc, &mut hooks, detached, &mut vnode);
        assert_eq!(hooks.0, 0);

        let root = doc.root();
        let mut vnode = VNode::Element(element("span"));
        mount(&mut doc, &mut hooks, root, &mut vnode);
        assert_eq!(hooks.0, 1);
    }
}
