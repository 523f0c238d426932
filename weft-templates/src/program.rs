use weft_vdom::Modifiers;

use crate::expressions::Expression;

/// The compiled form of a template: a tree of ops evaluated against a
/// render context to produce vnodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) name: String,
    pub(crate) source: String,
    pub(crate) root: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Text(String),
    Comment(String),
    Element(ElementOp),
    /// Dynamic text; the body renders when the value is null
    Esc { expr: Expression, body: Vec<Op> },
    Raw { expr: Expression },
    Set { name: String, value: Option<Expression>, body: Vec<Op> },
    Cond { arms: Vec<CondArm> },
    Loop { binding: String, expr: Expression, body: Vec<Op> },
    Call { template: String, body: Vec<Op> },
    Widget(WidgetOp),
    /// `t-debug` (no expression) and `t-log`
    Log { expr: Option<Expression> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CondArm {
    pub(crate) cond: Option<Expression>,
    pub(crate) body: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementOp {
    pub(crate) tag: String,
    pub(crate) static_attrs: Vec<(String, String)>,
    pub(crate) dyn_attrs: Vec<DynAttr>,
    pub(crate) listeners: Vec<ListenerOp>,
    pub(crate) ref_expr: Option<Expression>,
    pub(crate) key: Option<Expression>,
    pub(crate) transition: Option<String>,
    pub(crate) children: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DynAttr {
    /// `t-att-<name>="expr"`
    Value { name: String, expr: Expression },
    /// `t-attf-<name>="lit{{expr}}lit"`
    Format { name: String, expr: Expression },
    /// `t-att="expr"`: a `[name, value]` pair or a map
    Spread { expr: Expression },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListenerOp {
    pub(crate) event: String,
    pub(crate) mods: Modifiers,
    pub(crate) handler: HandlerExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HandlerExpr {
    /// A bare method name
    Name(String),
    /// `name(args...)` with the arguments bound at render time
    Call { name: String, args: Vec<Expression> },
    /// Any other expression; its string value names the handler
    Dynamic(Expression),
}

/// A widget placeholder. `id` identifies the template position, which
/// together with the key forms the child fingerprint used for reuse.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WidgetOp {
    pub(crate) id: u64,
    pub(crate) expr: Expression,
    pub(crate) ref_expr: Option<Expression>,
    pub(crate) key: Option<Expression>,
}
