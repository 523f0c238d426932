use tracing::warn;

use crate::directives::{self, Directive, DirectiveUse};
use crate::error::{CompileError, Error, Result};
use crate::expressions::{Expression, parser};
use crate::markup::{MarkupElement, MarkupNode};
use crate::program::{CondArm, DynAttr, ElementOp, HandlerExpr, ListenerOp, Op, Program, WidgetOp};

/// Per-node directive accumulator, filled by the directive `apply`
/// callbacks in priority order and assembled into ops afterwards.
#[derive(Default)]
pub(crate) struct NodeAcc {
    pub(crate) foreach: Option<String>,
    pub(crate) binding: Option<String>,
    pub(crate) key: Option<String>,
    pub(crate) cond: Option<CondKind>,
    pub(crate) call: Option<String>,
    pub(crate) set_name: Option<String>,
    pub(crate) set_value: Option<String>,
    pub(crate) esc: Option<String>,
    pub(crate) raw: Option<String>,
    pub(crate) dyn_attrs: Vec<DynAttrAcc>,
    pub(crate) listeners: Vec<(String, weft_vdom::Modifiers, String)>,
    pub(crate) ref_expr: Option<String>,
    pub(crate) widget: Option<String>,
    pub(crate) transition: Option<String>,
    pub(crate) debug: bool,
    pub(crate) log: Option<String>,
}

pub(crate) enum CondKind {
    If(String),
    Elif(String),
    Else,
}

pub(crate) enum DynAttrAcc {
    Value { name: String, src: String },
    Format { name: String, src: String },
    Spread { src: String },
}

/// Scratch state threaded through the compilation of one template.
pub(crate) struct Compilation<'a> {
    template: &'a str,
    directives: &'a [Directive],
    locals: Vec<Vec<String>>,
    in_pre: bool,
    in_loop: bool,
    key_warned: bool,
    next_widget_id: u64,
}

pub(crate) fn compile(name: &str, source: &str, root: &MarkupElement, directives: &[Directive]) -> Result<Program> {
    let mut compilation = Compilation {
        template: name,
        directives,
        locals: vec![],
        in_pre: false,
        in_loop: false,
        key_warned: false,
        next_widget_id: 0,
    };

    let nodes = [MarkupNode::Element(root.clone())];
    let root_ops = compilation.compile_children(&nodes)?;

    Ok(Program {
        name: name.to_string(),
        source: source.to_string(),
        root: root_ops,
    })
}

impl Compilation<'_> {
    fn compile_children(&mut self, nodes: &[MarkupNode]) -> Result<Vec<Op>> {
        self.locals.push(vec![]);
        let result = self.compile_children_inner(nodes);
        self.locals.pop();
        result
    }

    fn compile_children_inner(&mut self, nodes: &[MarkupNode]) -> Result<Vec<Op>> {
        let mut out = vec![];

        for node in nodes {
            match node {
                MarkupNode::Text(text) => {
                    if let Some(text) = normalise_text(text, self.in_pre) {
                        out.push(Op::Text(text));
                    }
                }
                MarkupNode::Comment(text) => out.push(Op::Comment(text.clone())),
                MarkupNode::Element(el) => {
                    let (ops, cond) = self.compile_element(el)?;
                    match cond {
                        None => out.extend(ops),
                        Some(CondKind::If(src)) => {
                            let cond = self.parse_expr(&src)?;
                            out.push(Op::Cond {
                                arms: vec![CondArm {
                                    cond: Some(cond),
                                    body: ops,
                                }],
                            });
                        }
                        Some(CondKind::Elif(src)) => {
                            let cond = self.parse_expr(&src)?;
                            attach_arm(
                                &mut out,
                                CondArm {
                                    cond: Some(cond),
                                    body: ops,
                                },
                            )?;
                        }
                        Some(CondKind::Else) => attach_arm(&mut out, CondArm { cond: None, body: ops })?,
                    }
                }
            }
        }

        Ok(out)
    }

    fn compile_element(&mut self, el: &MarkupElement) -> Result<(Vec<Op>, Option<CondKind>)> {
        let mut static_attrs = vec![];
        let mut uses = vec![];

        for (name, value) in &el.attrs {
            if name.starts_with("t-") {
                match directives::find(self.directives, name) {
                    Some((directive, arg)) => uses.push((directive, arg, value)),
                    None => return Err(CompileError::UnknownDirective(name.clone()).into()),
                }
            } else {
                static_attrs.push((name.clone(), value.clone()));
            }
        }

        // Stable sort: same-priority directives keep their source order
        uses.sort_by_key(|(directive, ..)| directive.priority);

        let mut acc = NodeAcc::default();
        for (directive, arg, value) in uses {
            let use_ = DirectiveUse {
                arg: arg.as_deref(),
                value: value.as_str(),
            };
            (directive.apply)(&mut acc, &use_)?;
        }

        // `t-foreach` wraps everything else, so its expression is parsed
        // outside the loop scope and the loop variables are declared
        // before the node body compiles
        let mut loop_ctx = None;
        if let Some(foreach_src) = &acc.foreach {
            let binding = acc.binding.clone().ok_or(CompileError::MissingLoopBinding)?;
            let expr = self.parse_expr(foreach_src)?;
            self.locals.push(loop_bindings(&binding));
            loop_ctx = Some((expr, binding, self.in_loop));
            self.in_loop = true;
        }

        let inner = self.assemble(el, &mut acc, static_attrs);

        match loop_ctx {
            None => Ok((inner?, acc.cond)),
            Some((expr, binding, was_in_loop)) => {
                self.locals.pop();
                self.in_loop = was_in_loop;

                let mut body = inner?;
                if !self.key_warned && body.iter().any(|op| matches!(op, Op::Element(el) if el.key.is_none())) {
                    self.key_warned = true;
                    warn!(
                        template = %self.template,
                        "element inside t-foreach is missing t-key; falling back to index reconciliation"
                    );
                }

                // a condition on the looping node applies per iteration
                match acc.cond {
                    None => (),
                    Some(CondKind::If(src)) => {
                        let cond = self.parse_expr(&src)?;
                        body = vec![Op::Cond {
                            arms: vec![CondArm {
                                cond: Some(cond),
                                body,
                            }],
                        }];
                    }
                    Some(CondKind::Elif(_) | CondKind::Else) => {
                        return Err(CompileError::MisplacedElse.into());
                    }
                }

                Ok((vec![Op::Loop { binding, expr, body }], None))
            }
        }
    }

    fn assemble(&mut self, el: &MarkupElement, acc: &mut NodeAcc, static_attrs: Vec<(String, String)>) -> Result<Vec<Op>> {
        let mut ops = vec![];

        if acc.debug {
            ops.push(Op::Log { expr: None });
        }
        if let Some(log_src) = &acc.log {
            let expr = self.parse_expr(log_src)?;
            ops.push(Op::Log { expr: Some(expr) });
        }

        if let Some(template) = &acc.call {
            if el.tag != "t" {
                return Err(CompileError::InvalidTag(el.tag.clone()).into());
            }
            let body = self.compile_children(&el.children)?;
            ops.push(Op::Call {
                template: template.clone(),
                body,
            });
            return Ok(ops);
        }

        if let Some(name) = &acc.set_name {
            // t-value takes priority over the body
            let value = acc.set_value.as_ref().map(|src| self.parse_expr(src)).transpose()?;
            let body = match value.is_some() {
                true => vec![],
                false => self.compile_children(&el.children)?,
            };
            self.declare(name.clone());
            ops.push(Op::Set {
                name: name.clone(),
                value,
                body,
            });
            return Ok(ops);
        }

        if let Some(widget_src) = &acc.widget {
            let expr = self.parse_expr(widget_src)?;
            let ref_expr = acc.ref_expr.as_ref().map(|src| self.parse_expr(src)).transpose()?;
            let key = acc.key.as_ref().map(|src| self.parse_expr(src)).transpose()?;
            let id = self.next_widget_id;
            self.next_widget_id += 1;
            ops.push(Op::Widget(WidgetOp {
                id,
                expr,
                ref_expr,
                key,
            }));
            return Ok(ops);
        }

        let content = if let Some(esc_src) = &acc.esc {
            let expr = self.parse_expr(esc_src)?;
            let body = self.compile_children(&el.children)?;
            vec![Op::Esc { expr, body }]
        } else if let Some(raw_src) = &acc.raw {
            vec![Op::Raw {
                expr: self.parse_expr(raw_src)?,
            }]
        } else {
            let was_pre = self.in_pre;
            if el.tag == "pre" {
                self.in_pre = true;
            }
            let children = self.compile_children(&el.children);
            self.in_pre = was_pre;
            children?
        };

        // A plain `t` node groups; its children hoist into the parent
        if el.tag == "t" {
            ops.extend(content);
            return Ok(ops);
        }

        let mut dyn_attrs = vec![];
        for attr in &acc.dyn_attrs {
            dyn_attrs.push(match attr {
                DynAttrAcc::Value { name, src } => DynAttr::Value {
                    name: name.clone(),
                    expr: self.parse_expr(src)?,
                },
                DynAttrAcc::Format { name, src } => DynAttr::Format {
                    name: name.clone(),
                    expr: self.parse_format(src)?,
                },
                DynAttrAcc::Spread { src } => DynAttr::Spread {
                    expr: self.parse_expr(src)?,
                },
            });
        }

        let mut listeners = vec![];
        for (event, mods, src) in &acc.listeners {
            listeners.push(ListenerOp {
                event: event.clone(),
                mods: *mods,
                handler: self.parse_handler(src)?,
            });
        }

        let ref_expr = acc.ref_expr.as_ref().map(|src| self.parse_expr(src)).transpose()?;
        let key = acc.key.as_ref().map(|src| self.parse_expr(src)).transpose()?;

        ops.push(Op::Element(ElementOp {
            tag: el.tag.clone(),
            static_attrs,
            dyn_attrs,
            listeners,
            ref_expr,
            key,
            transition: acc.transition.clone(),
            children: content,
        }));

        Ok(ops)
    }

    fn declare(&mut self, name: String) {
        self.locals
            .last_mut()
            .expect("compilation always holds a scope frame")
            .push(name);
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals.iter().any(|frame| frame.iter().any(|local| local == name))
    }

    fn parse_expr(&self, src: &str) -> Result<Expression> {
        let expr = parser::parse(src).map_err(|err| self.expr_error(err.to_string()))?;
        self.finish_expr(expr)
    }

    fn finish_expr(&self, expr: Expression) -> Result<Expression> {
        if expr.has_call() {
            return Err(self.expr_error("function calls are only allowed in event handlers".into()));
        }
        Ok(expr.resolve(&|name| self.is_local(name)))
    }

    fn parse_handler(&self, src: &str) -> Result<HandlerExpr> {
        let expr = parser::parse(src).map_err(|err| self.expr_error(err.to_string()))?;
        match expr {
            Expression::Ident(name) => Ok(HandlerExpr::Name(name)),
            Expression::Call { fun, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| self.finish_expr(arg))
                    .collect::<Result<Vec<_>>>()?;
                Ok(HandlerExpr::Call { name: fun, args })
            }
            expr => Ok(HandlerExpr::Dynamic(self.finish_expr(expr)?)),
        }
    }

    fn parse_format(&self, src: &str) -> Result<Expression> {
        let mut segments = vec![];
        let mut rest = src;

        loop {
            match rest.find("{{") {
                None => {
                    if !rest.is_empty() {
                        segments.push(Expression::Str(rest.to_string()));
                    }
                    break;
                }
                Some(start) => {
                    if start > 0 {
                        segments.push(Expression::Str(rest[..start].to_string()));
                    }
                    let after = &rest[start + 2..];
                    let Some(end) = after.find("}}") else {
                        return Err(self.expr_error("unterminated '{{' in a format attribute".into()));
                    };
                    segments.push(self.parse_expr(&after[..end])?);
                    rest = &after[end + 2..];
                }
            }
        }

        Ok(Expression::Segments(segments))
    }

    fn expr_error(&self, detail: String) -> Error {
        CompileError::InvalidExpression {
            template: self.template.to_string(),
            detail,
        }
        .into()
    }
}

fn attach_arm(out: &mut [Op], arm: CondArm) -> Result<()> {
    match out.last_mut() {
        Some(Op::Cond { arms }) => {
            arms.push(arm);
            Ok(())
        }
        _ => Err(CompileError::MisplacedElse.into()),
    }
}

fn loop_bindings(binding: &str) -> Vec<String> {
    vec![
        binding.to_string(),
        format!("{binding}_index"),
        format!("{binding}_value"),
        format!("{binding}_first"),
        format!("{binding}_last"),
        format!("{binding}_parity"),
    ]
}

/// Outside `<pre>`, whitespace-only text containing a newline is
/// dropped and other whitespace runs collapse to one space.
fn normalise_text(text: &str, in_pre: bool) -> Option<String> {
    if in_pre {
        return Some(text.to_string());
    }

    if text.trim().is_empty() {
        return match text.contains('\n') {
            true => None,
            false => Some(" ".to_string()),
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_whitespace() {
            in_run = true;
            continue;
        }
        if in_run {
            if !out.is_empty() || text.starts_with(|c: char| c.is_whitespace()) {
                out.push(' ');
            }
            in_run = false;
        }
        out.push(c);
    }
    if in_run {
        out.push(' ');
    }

    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markup::parse_document;

    fn compiled(src: &str) -> Program {
        let root = parse_document(src).unwrap();
        let directives = directives::default_directives();
        compile("test", src, &root, &directives).unwrap()
    }

    fn compile_err(src: &str) -> Error {
        let root = parse_document(src).unwrap();
        let directives = directives::default_directives();
        compile("test", src, &root, &directives).unwrap_err()
    }

    #[test]
    fn plain_element() {
        let program = compiled(r#"<div class="x">hi</div>"#);
        let [Op::Element(el)] = &program.root[..] else {
            panic!("expected a single element op")
        };
        assert_eq!(el.tag, "div");
        assert_eq!(el.static_attrs, [("class".to_string(), "x".to_string())]);
        assert_eq!(el.children, [Op::Text("hi".into())]);
    }

    #[test]
    fn t_node_hoists_children() {
        let program = compiled("<t><span/><span/></t>");
        assert_eq!(program.root.len(), 2);
    }

    #[test]
    fn unknown_directive() {
        let err = compile_err(r#"<div t-bogus="1"/>"#);
        assert_eq!(err, CompileError::UnknownDirective("t-bogus".into()).into());
        assert_eq!(err.to_string(), "Unknown QWeb directive: 't-bogus'");
    }

    #[test]
    fn call_requires_t_element() {
        let err = compile_err(r#"<div t-call="other"/>"#);
        assert_eq!(err, CompileError::InvalidTag("div".into()).into());
    }

    #[test]
    fn missing_event_name() {
        let err = compile_err(r#"<button t-on="inc"/>"#);
        assert_eq!(err, CompileError::MissingEventName.into());
        assert_eq!(err.to_string(), "Missing event name with t-on directive");
    }

    #[test]
    fn foreach_requires_t_as() {
        let err = compile_err(r#"<t t-foreach="[1]"><span/></t>"#);
        assert_eq!(err, CompileError::MissingLoopBinding.into());
    }

    #[test]
    fn foreach_declares_loop_variables() {
        let program = compiled(r#"<t t-foreach="[1]" t-as="item"><span t-esc="item_index"/></t>"#);
        let [Op::Loop { binding, body, .. }] = &program.root[..] else {
            panic!("expected a loop op")
        };
        assert_eq!(binding, "item");
        let [Op::Element(span)] = &body[..] else { panic!("expected span") };
        let [Op::Esc { expr, .. }] = &span.children[..] else {
            panic!("expected esc")
        };
        assert_eq!(expr, &Expression::Local("item_index".into()));
    }

    #[test]
    fn idents_without_binding_resolve_to_context() {
        let program = compiled(r#"<span t-esc="value"/>"#);
        let [Op::Element(span)] = &program.root[..] else { panic!() };
        let [Op::Esc { expr, .. }] = &span.children[..] else { panic!() };
        assert_eq!(expr, &Expression::Ctx("value".into()));
    }

    #[test]
    fn set_declares_for_following_siblings() {
        let program = compiled(r#"<div><t t-set="x" t-value="1"/><span t-esc="x"/></div>"#);
        let [Op::Element(div)] = &program.root[..] else { panic!() };
        let [Op::Set { .. }, Op::Element(span)] = &div.children[..] else {
            panic!("expected set then span")
        };
        let [Op::Esc { expr, .. }] = &span.children[..] else { panic!() };
        assert_eq!(expr, &Expression::Local("x".into()));
    }

    #[test]
    fn elif_and_else_attach_to_the_preceding_if() {
        let program = compiled(
            r#"<div>
                <span t-if="a">a</span>
                <span t-elif="b">b</span>
                <span t-else="">c</span>
            </div>"#,
        );
        let [Op::Element(div)] = &program.root[..] else { panic!() };
        let [Op::Cond { arms }] = &div.children[..] else {
            panic!("expected a single cond op")
        };
        assert_eq!(arms.len(), 3);
        assert!(arms[0].cond.is_some());
        assert!(arms[1].cond.is_some());
        assert!(arms[2].cond.is_none());
    }

    #[test]
    fn orphan_else_is_an_error() {
        let err = compile_err(r#"<div><span t-else="">c</span></div>"#);
        assert_eq!(err, CompileError::MisplacedElse.into());
    }

    #[test]
    fn calls_outside_handlers_are_rejected() {
        let err = compile_err(r#"<span t-esc="f(1)"/>"#);
        let Error::Compile(CompileError::InvalidExpression { template, .. }) = &err else {
            panic!("expected an expression error, got {err:?}")
        };
        assert_eq!(template, "test");
    }

    #[test]
    fn pre_preserves_text() {
        let program = compiled("<pre>  a\n  b  </pre>");
        let [Op::Element(pre)] = &program.root[..] else { panic!() };
        assert_eq!(pre.children, [Op::Text("  a\n  b  ".into())]);
    }

    #[test]
    fn whitespace_normalisation() {
        assert_eq!(normalise_text("  \n  ", false), None);
        assert_eq!(normalise_text("   ", false), Some(" ".into()));
        assert_eq!(normalise_text("a   b", false), Some("a b".into()));
        assert_eq!(normalise_text("  a\n b ", false), Some(" a b ".into()));
        assert_eq!(normalise_text("  a ", true), Some("  a ".into()));
    }

    #[test]
    fn format_attribute_segments() {
        let program = compiled(r#"<div t-attf-class="pre-{{x}}-post"/>"#);
        let [Op::Element(div)] = &program.root[..] else { panic!() };
        let [DynAttr::Format { name, expr }] = &div.dyn_attrs[..] else {
            panic!("expected a format attr")
        };
        assert_eq!(name, "class");
        let Expression::Segments(segments) = expr else { panic!() };
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn handler_forms() {
        let program = compiled(r#"<div><button t-on-click="inc"/><button t-on-click="add(2)"/></div>"#);
        let [Op::Element(div)] = &program.root[..] else { panic!() };
        let [Op::Element(first), Op::Element(second)] = &div.children[..] else {
            panic!()
        };
        assert_eq!(first.listeners[0].handler, HandlerExpr::Name("inc".into()));
        assert_eq!(
            second.listeners[0].handler,
            HandlerExpr::Call {
                name: "add".into(),
                args: vec![Expression::Int(2)],
            }
        );
    }
}
