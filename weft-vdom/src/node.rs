use weft_state::Value;

use crate::dom::NodeId;
use crate::events::Listener;

/// The selector marking a fragment: a grouping node whose children are
/// hoisted into the surrounding children list instead of producing a
/// document node of its own.
pub const FRAGMENT_SEL: &str = "t";

// Attributes that are reflected as element properties as well as
// document attributes when truthy, and removed entirely when falsy.
const BOOL_ATTRS: &[&str] = &[
    "checked", "selected", "disabled", "readonly", "required", "autofocus", "multiple", "open", "hidden",
];

pub fn is_bool_attr(name: &str) -> bool {
    BOOL_ATTRS.contains(&name)
}

/// A sibling identity used by the keyed diff.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Keys come out of template expressions; anything that isn't null
    /// keys by its integer or string form.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Null => None,
            Value::Int(n) => Some(Key::Int(*n)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            other => Some(Key::Str(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    /// A present boolean attribute (`checked`, `disabled`, ...)
    Flag,
}

/// An insertion-ordered attribute list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    entries: Vec<(String, AttrValue)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self { entries: vec![] }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set an attribute, keeping the original position on overwrite.
    pub fn set(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn set_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set(name, AttrValue::Text(value.into()));
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VElement {
    pub sel: String,
    pub key: Option<Key>,
    pub attrs: Attributes,
    pub listeners: Vec<Listener>,
    pub transition: Option<String>,
    pub children: Vec<VNode>,
    pub elm: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VText {
    pub text: String,
    pub elm: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VComment {
    pub text: String,
    pub elm: Option<NodeId>,
}

/// A descriptor of a document node, the input to the patcher.
#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    Element(VElement),
    Text(VText),
    Comment(VComment),
}

impl VNode {
    pub fn element(sel: impl Into<String>) -> Self {
        VNode::Element(VElement {
            sel: sel.into(),
            key: None,
            attrs: Attributes::new(),
            listeners: vec![],
            transition: None,
            children: vec![],
            elm: None,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        VNode::Text(VText {
            text: text.into(),
            elm: None,
        })
    }

    pub fn comment(text: impl Into<String>) -> Self {
        VNode::Comment(VComment {
            text: text.into(),
            elm: None,
        })
    }

    /// A grouping node: no document node of its own, children spliced
    /// into the surrounding list when pushed.
    pub fn fragment(children: Vec<VNode>) -> Self {
        let VNode::Element(mut el) = VNode::element(FRAGMENT_SEL) else { unreachable!() };
        el.children = children;
        VNode::Element(el)
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self, VNode::Element(el) if el.sel == FRAGMENT_SEL)
    }

    /// The document node this vnode was created/patched onto.
    pub fn elm(&self) -> Option<NodeId> {
        match self {
            VNode::Element(el) => el.elm,
            VNode::Text(text) => text.elm,
            VNode::Comment(comment) => comment.elm,
        }
    }

    /// Append into a children list, hoisting fragments.
    pub fn push_into(self, out: &mut Vec<VNode>) {
        match self {
            VNode::Element(el) if el.sel == FRAGMENT_SEL => {
                for child in el.children {
                    child.push_into(out);
                }
            }
            node => out.push(node),
        }
    }

    /// Two vnodes describe the same document node when their kind matches
    /// and, for elements, selector and key both match.
    pub fn same_node(&self, other: &VNode) -> bool {
        match (self, other) {
            (VNode::Element(lhs), VNode::Element(rhs)) => lhs.sel == rhs.sel && lhs.key == rhs.key,
            (VNode::Text(_), VNode::Text(_)) => true,
            (VNode::Comment(_), VNode::Comment(_)) => true,
            _ => false,
        }
    }
}
