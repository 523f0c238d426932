use std::collections::HashSet;

use tracing::debug;
use weft_state::{Value, ValueMap};
use weft_vdom::{AttrValue, HandlerRef, Key, Listener, VNode, is_bool_attr};

use crate::error::{RenderError, Result};
use crate::expressions::Expression;
use crate::expressions::eval::eval;
use crate::markup::{self, MarkupNode};
use crate::program::{DynAttr, ElementOp, HandlerExpr, Op, Program, WidgetOp};
use crate::qweb::QWeb;

/// The evaluation context a template renders against.
///
/// `values` is the root of every `Ctx` lookup, `handlers` is the set of
/// callable names listeners may bind to and `owner` tags the emitted
/// listener descriptors with the widget scope that owns them.
#[derive(Debug, Default)]
pub struct Context {
    pub values: ValueMap,
    pub handlers: HashSet<String>,
    pub owner: u64,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name, value);
        self
    }

    pub fn with_handler(mut self, name: impl Into<String>) -> Self {
        self.handlers.insert(name.into());
        self
    }

    pub fn with_owner(mut self, owner: u64) -> Self {
        self.owner = owner;
        self
    }
}

/// Auxiliary render channels: listeners, ref bindings and sub-widget
/// placeholders produced while the vnode tree is assembled.
#[derive(Debug, Default)]
pub struct Extra {
    pub handlers: Vec<HandlerRef>,
    pub refs: Vec<RefBinding>,
    pub widgets: Vec<WidgetSpawn>,
}

impl Extra {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A `t-ref` binding; `path` is the child-index route from the root
/// vnode to the referenced node.
#[derive(Debug, Clone, PartialEq)]
pub struct RefBinding {
    pub name: String,
    pub path: Vec<usize>,
}

/// A `t-widget` placeholder left in the tree as a comment node.
/// `position` identifies the directive's spot in the template, which
/// combined with `key` fingerprints the child for reuse.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetSpawn {
    pub position: u64,
    pub name: String,
    pub key: Option<Key>,
    pub ref_name: Option<String>,
    pub path: Vec<usize>,
}

// -----------------------------------------------------------------------------
//   - Scope -
// -----------------------------------------------------------------------------
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Val(Value),
    /// A rendered template fragment (bodied `t-set`, `t-call` body)
    Fragment(Vec<VNode>),
}

#[derive(Debug)]
pub(crate) struct Scope {
    frames: Vec<Vec<(String, Binding)>>,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Self { frames: vec![vec![]] }
    }

    fn push(&mut self) {
        self.frames.push(vec![]);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, name: impl Into<String>, binding: Binding) {
        let name = name.into();
        let frame = self.frames.last_mut().expect("the scope always holds a frame");
        match frame.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = binding,
            None => frame.push((name, binding)),
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.iter().rev().find(|(n, _)| n == name))
            .map(|(_, binding)| binding)
    }

    /// The value form of a binding; fragments read as their text.
    pub(crate) fn value(&self, name: &str) -> Option<Value> {
        match self.lookup(name)? {
            Binding::Val(value) => Some(value.clone()),
            Binding::Fragment(nodes) => Some(Value::Str(fragment_text(nodes))),
        }
    }
}

fn fragment_text(nodes: &[VNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            VNode::Text(text) => out.push_str(&text.text),
            VNode::Element(el) => out.push_str(&fragment_text(&el.children)),
            VNode::Comment(_) => (),
        }
    }
    out
}

// -----------------------------------------------------------------------------
//   - Executor -
// -----------------------------------------------------------------------------
pub(crate) struct Executor<'a> {
    qweb: &'a QWeb,
    ctx: &'a Context,
    extra: &'a mut Extra,
    scope: Scope,
    path: Vec<usize>,
    template: &'a str,
    source: &'a str,
    /// Rendering into a fragment binding: paths into the live tree do
    /// not exist there, so refs/widgets/handlers are not recorded
    detached: bool,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(qweb: &'a QWeb, ctx: &'a Context, extra: &'a mut Extra, program: &'a Program) -> Self {
        Self {
            qweb,
            ctx,
            extra,
            scope: Scope::new(),
            path: vec![],
            template: &program.name,
            source: &program.source,
            detached: false,
        }
    }

    fn eval(&self, expr: &Expression) -> Value {
        eval(expr, &self.scope, self.ctx)
    }

    pub(crate) fn exec_ops(&mut self, ops: &[Op], out: &mut Vec<VNode>) -> Result<()> {
        for op in ops {
            self.exec_op(op, out)?;
        }
        Ok(())
    }

    fn exec_op(&mut self, op: &Op, out: &mut Vec<VNode>) -> Result<()> {
        match op {
            Op::Text(text) => out.push(VNode::text(text.clone())),
            Op::Comment(text) => out.push(VNode::comment(text.clone())),

            Op::Esc { expr, body } => match self.eval(expr) {
                Value::Null => self.exec_ops(body, out)?,
                value => out.push(VNode::text(value.to_string())),
            },

            Op::Raw { expr } => self.exec_raw(expr, out)?,

            Op::Set { name, value, body } => {
                let binding = match value {
                    Some(expr) => Binding::Val(self.eval(expr)),
                    None => {
                        let mut nodes = vec![];
                        self.exec_detached(body, &mut nodes)?;
                        Binding::Fragment(nodes)
                    }
                };
                self.scope.declare(name.clone(), binding);
            }

            Op::Cond { arms } => {
                for arm in arms {
                    let live = match &arm.cond {
                        Some(cond) => self.eval(cond).is_truthy(),
                        None => true,
                    };
                    if live {
                        self.exec_ops(&arm.body, out)?;
                        break;
                    }
                }
            }

            Op::Loop { binding, expr, body } => self.exec_loop(binding, expr, body, out)?,

            Op::Call { template, body } => self.exec_call(template, body, out)?,

            Op::Element(el) => self.exec_element(el, out)?,

            Op::Widget(widget) => self.exec_widget(widget, out)?,

            Op::Log { expr } => match expr {
                Some(expr) => {
                    let value = self.eval(expr);
                    debug!(template = %self.template, value = %value, "t-log");
                }
                None => debug!(template = %self.template, source = %self.source, "t-debug"),
            },
        }

        Ok(())
    }

    fn exec_detached(&mut self, ops: &[Op], out: &mut Vec<VNode>) -> Result<()> {
        let was = self.detached;
        self.detached = true;
        let result = self.exec_ops(ops, out);
        self.detached = was;
        result
    }

    fn exec_raw(&mut self, expr: &Expression, out: &mut Vec<VNode>) -> Result<()> {
        // A name bound to a fragment splices its nodes. The call body
        // renders under the scope name `0`, which lexes as a number.
        let fragment_name = match expr {
            Expression::Local(name) | Expression::Ctx(name) => Some(name.as_str()),
            Expression::Int(0) => Some("0"),
            _ => None,
        };
        if let Some(name) = fragment_name {
            if let Some(Binding::Fragment(nodes)) = self.scope.lookup(name) {
                for node in nodes.clone() {
                    node.push_into(out);
                }
                return Ok(());
            }
        }

        let value = self.eval(expr);
        if value.is_null() {
            return Ok(());
        }

        let text = value.to_string();
        match markup::parse_fragment(&text) {
            Ok(nodes) => {
                for node in &nodes {
                    out.push(markup_to_vnode(node));
                }
            }
            // unparseable raw markup degrades to text
            Err(_) => out.push(VNode::text(text)),
        }

        Ok(())
    }

    fn exec_loop(&mut self, binding: &str, expr: &Expression, body: &[Op], out: &mut Vec<VNode>) -> Result<()> {
        let items: Vec<(Value, Value)> = match self.eval(expr) {
            Value::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(index, item)| (Value::Int(index as i64), item))
                .collect(),
            Value::Map(map) => map
                .iter()
                .map(|(key, value)| (Value::Str(key.to_string()), value.clone()))
                .collect(),
            Value::Int(n) if n >= 0 => (0..n).map(|index| (Value::Int(index), Value::Int(index))).collect(),
            _ => return Err(RenderError::InvalidLoop.into()),
        };

        let len = items.len();
        for (position, (index, item)) in items.into_iter().enumerate() {
            self.scope.push();
            self.scope.declare(binding, Binding::Val(item.clone()));
            self.scope.declare(format!("{binding}_index"), Binding::Val(index));
            self.scope.declare(format!("{binding}_value"), Binding::Val(item));
            self.scope
                .declare(format!("{binding}_first"), Binding::Val(Value::Bool(position == 0)));
            self.scope
                .declare(format!("{binding}_last"), Binding::Val(Value::Bool(position + 1 == len)));
            let parity = match position % 2 {
                0 => "even",
                _ => "odd",
            };
            self.scope.declare(format!("{binding}_parity"), Binding::Val(parity.into()));

            let result = self.exec_ops(body, out);
            self.scope.pop();
            result?;
        }

        Ok(())
    }

    fn exec_call(&mut self, template: &str, body: &[Op], out: &mut Vec<VNode>) -> Result<()> {
        let qweb = self.qweb;
        let Some(program) = qweb.program(template) else {
            return Err(RenderError::UnknownTemplate(template.to_string()).into());
        };

        // The body is a pre-block: its `t-set`s land in this frame and
        // leak into the callee, its rendered nodes become variable `0`
        self.scope.push();
        let mut body_nodes = vec![];
        let result = self.exec_detached(body, &mut body_nodes);
        if let Err(err) = result {
            self.scope.pop();
            return Err(err);
        }
        self.scope.declare("0", Binding::Fragment(body_nodes));

        let saved_template = std::mem::replace(&mut self.template, program.name.as_str());
        let saved_source = std::mem::replace(&mut self.source, program.source.as_str());
        let result = self.exec_ops(&program.root, out);
        self.template = saved_template;
        self.source = saved_source;
        self.scope.pop();
        result
    }

    fn exec_element(&mut self, el: &ElementOp, out: &mut Vec<VNode>) -> Result<()> {
        let index = out.len();
        self.path.push(index);

        let mut children = vec![];
        let result = self.exec_ops(&el.children, &mut children);
        if let Err(err) = result {
            self.path.pop();
            return Err(err);
        }

        let VNode::Element(mut velem) = VNode::element(el.tag.clone()) else {
            unreachable!()
        };
        velem.children = children;

        for (name, value) in &el.static_attrs {
            velem.attrs.set_text(name.clone(), value.clone());
        }

        for attr in &el.dyn_attrs {
            match attr {
                DynAttr::Value { name, expr } => {
                    let value = self.eval(expr);
                    self.apply_dyn_attr(&mut velem.attrs, name, value);
                }
                DynAttr::Format { name, expr } => {
                    let value = self.eval(expr);
                    self.apply_dyn_attr(&mut velem.attrs, name, value);
                }
                DynAttr::Spread { expr } => match self.eval(expr) {
                    // a [name, value] pair
                    Value::List(pair) if pair.len() == 2 => {
                        if let Value::Str(name) = &pair[0] {
                            let name = name.clone();
                            self.apply_dyn_attr(&mut velem.attrs, &name, pair[1].clone());
                        }
                    }
                    Value::Map(map) => {
                        for (name, value) in map.iter() {
                            let name = name.to_string();
                            self.apply_dyn_attr(&mut velem.attrs, &name, value.clone());
                        }
                    }
                    _ => (),
                },
            }
        }

        for listener in &el.listeners {
            let (name, args) = match &listener.handler {
                HandlerExpr::Name(name) => (name.clone(), vec![]),
                HandlerExpr::Call { name, args } => {
                    (name.clone(), args.iter().map(|arg| self.eval(arg)).collect())
                }
                HandlerExpr::Dynamic(expr) => (self.eval(expr).to_string(), vec![]),
            };

            if !self.ctx.handlers.contains(&name) {
                return Err(RenderError::MissingHandler {
                    handler: name,
                    template: self.template.to_string(),
                }
                .into());
            }

            let handler = HandlerRef {
                owner: self.ctx.owner,
                name,
                args,
            };
            if !self.detached {
                self.extra.handlers.push(handler.clone());
            }
            velem.listeners.push(Listener {
                event: listener.event.clone(),
                mods: listener.mods,
                handler,
            });
        }

        if let Some(expr) = &el.ref_expr {
            let name = self.eval(expr).to_string();
            if !self.detached && !name.is_empty() {
                self.extra.refs.push(RefBinding {
                    name,
                    path: self.path.clone(),
                });
            }
        }

        if let Some(expr) = &el.key {
            velem.key = Key::from_value(&self.eval(expr));
        }

        velem.transition = el.transition.clone();

        self.path.pop();
        out.push(VNode::Element(velem));
        Ok(())
    }

    // Falsy values suppress the attribute; zero does not, matching the
    // host dialect. Dynamic class/style merge into their static part.
    fn apply_dyn_attr(&self, attrs: &mut weft_vdom::Attributes, name: &str, value: Value) {
        let suppressed = matches!(&value, Value::Null | Value::Bool(false)) || matches!(&value, Value::Str(s) if s.is_empty());
        if suppressed {
            return;
        }

        if is_bool_attr(name) {
            if value.is_truthy() {
                attrs.set(name.to_string(), AttrValue::Flag);
            }
            return;
        }

        let rendered = value.to_string();
        let merged = match (name, attrs.get(name)) {
            ("class", Some(AttrValue::Text(existing))) if !existing.is_empty() => {
                format!("{existing} {rendered}")
            }
            ("style", Some(AttrValue::Text(existing))) if !existing.is_empty() => {
                format!("{existing}; {rendered}")
            }
            _ => rendered,
        };
        attrs.set_text(name.to_string(), merged);
    }

    fn exec_widget(&mut self, widget: &WidgetOp, out: &mut Vec<VNode>) -> Result<()> {
        let name = self.eval(&widget.expr).to_string();
        let key = widget.key.as_ref().and_then(|expr| Key::from_value(&self.eval(expr)));
        let ref_name = widget
            .ref_expr
            .as_ref()
            .map(|expr| self.eval(expr).to_string())
            .filter(|name| !name.is_empty());

        let index = out.len();
        if !self.detached {
            let mut path = self.path.clone();
            path.push(index);
            self.extra.widgets.push(WidgetSpawn {
                position: widget.id,
                name,
                key,
                ref_name,
                path,
            });
        }

        out.push(VNode::comment("widget"));
        Ok(())
    }
}

// Static conversion used by `t-raw` fragment parsing.
fn markup_to_vnode(node: &MarkupNode) -> VNode {
    match node {
        MarkupNode::Text(text) => VNode::text(text.clone()),
        MarkupNode::Comment(text) => VNode::comment(text.clone()),
        MarkupNode::Element(el) => {
            let VNode::Element(mut velem) = VNode::element(el.tag.clone()) else {
                unreachable!()
            };
            for (name, value) in &el.attrs {
                velem.attrs.set_text(name.clone(), value.clone());
            }
            velem.children = el.children.iter().map(markup_to_vnode).collect();
            VNode::Element(velem)
        }
    }
}
