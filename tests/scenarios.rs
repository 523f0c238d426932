use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use weft::prelude::*;
use weft::templates::error::{Error as TemplateError, RenderError};
use weft::vdom::patch::{mount, patch};
use weft::vdom::{Key, NoHooks};

// -----------------------------------------------------------------------------
//   - Widgets under test -
// -----------------------------------------------------------------------------
struct Counter;

impl Widget for Counter {
    fn template(&self) -> &str {
        "counter"
    }

    fn handlers(&self) -> &[&'static str] {
        &["inc"]
    }

    fn initial_state(&self) -> ValueMap {
        record! { "counter" => 0 }
    }

    fn on_event(&mut self, handler: &str, _args: &[Value], ctx: &mut WidgetCtx<'_>) {
        if handler == "inc" {
            let counter = ctx.state().get("counter").and_then(Value::as_int).unwrap_or(0);
            ctx.update_state(record! { "counter" => counter + 1 });
        }
    }
}

#[derive(Default)]
struct HookCount {
    will_start: usize,
    mounted: usize,
}

struct CountingChild {
    counter: Rc<RefCell<HookCount>>,
}

impl Widget for CountingChild {
    fn template(&self) -> &str {
        "child"
    }

    fn will_start(&mut self, _ctx: &mut WidgetCtx<'_>) -> weft::widgets::Result<()> {
        self.counter.borrow_mut().will_start += 1;
        Ok(())
    }

    fn mounted(&mut self, _ctx: &mut WidgetCtx<'_>) {
        self.counter.borrow_mut().mounted += 1;
    }
}

struct Toggle;

impl Widget for Toggle {
    fn template(&self) -> &str {
        "toggle"
    }

    fn initial_state(&self) -> ValueMap {
        record! { "ok" => false }
    }
}

// -----------------------------------------------------------------------------
//   - Scenarios -
// -----------------------------------------------------------------------------
#[test]
fn counter_widget_round_trip() -> Result<()> {
    let mut app = App::new();
    app.qweb_mut().add_template(
        "counter",
        r#"<div><t t-esc="state.counter"/><button t-on-click="inc">Inc</button></div>"#,
    )?;

    let id = app.create(Counter);
    app.mount(id, app.root())?;
    assert_eq!(app.document().inner_html(app.root()), "<div>0<button>Inc</button></div>");

    let div = app.document().children(app.root())[0];
    let button = app.document().children(div)[1];
    app.trigger(button, "click");
    app.flush()?;
    assert_eq!(app.document().inner_html(app.root()), "<div>1<button>Inc</button></div>");

    Ok(())
}

#[test]
fn static_and_dynamic_class_merge() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.add_template("t", r#"<div class="hello" t-att-class="'world'"/>"#)?;

    let mut vnode = qweb.render("t", &Context::new(), &mut Extra::new())?;
    let mut doc = Document::new();
    let root = doc.root();
    mount(&mut doc, &mut NoHooks, root, &mut vnode);

    assert_eq!(doc.inner_html(root), r#"<div class="hello world"></div>"#);
    Ok(())
}

#[test]
fn foreach_renders_index_and_item() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.add_template(
        "t",
        r#"<div><t t-foreach="[3,2,1]" t-as="item">[<t t-esc="item_index"/>:<t t-esc="item"/>]</t></div>"#,
    )?;

    let mut vnode = qweb.render("t", &Context::new(), &mut Extra::new())?;
    let mut doc = Document::new();
    let root = doc.root();
    mount(&mut doc, &mut NoHooks, root, &mut vnode);

    assert_eq!(doc.inner_html(root), "<div>[0:3][1:2][2:1]</div>");
    Ok(())
}

#[test]
fn call_body_sets_leak_into_the_callee() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.add_template("X", r#"<t t-esc="foo"/>"#)?;
    qweb.add_template("caller", r#"<t t-call="X"><t t-set="foo" t-value="'ok'"/></t>"#)?;

    let mut vnode = qweb.render("caller", &Context::new(), &mut Extra::new())?;
    let mut doc = Document::new();
    let root = doc.root();
    mount(&mut doc, &mut NoHooks, root, &mut vnode);

    assert_eq!(doc.inner_html(root), "ok");
    Ok(())
}

#[test]
fn conditional_child_fires_both_hooks_on_activation() -> Result<()> {
    let counter = Rc::new(RefCell::new(HookCount::default()));

    let mut app = App::new();
    app.qweb_mut()
        .add_template("toggle", r#"<div><t t-if="state.ok"><t t-widget="'Child'"/></t></div>"#)?;
    app.qweb_mut().add_template("child", "<span>child</span>")?;

    let hooks = counter.clone();
    app.register("Child", move || CountingChild { counter: hooks.clone() });

    let id = app.create(Toggle);
    app.mount(id, app.root())?;
    assert_eq!(counter.borrow().will_start + counter.borrow().mounted, 0);

    app.update_state(id, record! { "ok" => true });
    app.flush()?;

    assert_eq!(counter.borrow().will_start, 1);
    assert_eq!(counter.borrow().mounted, 1);
    Ok(())
}

#[test]
fn template_registration_errors() {
    let mut qweb = QWeb::new();

    let err = qweb.add_template("t", "<div>").unwrap_err();
    assert!(err.to_string().starts_with("Invalid XML in template"));
    assert!(!qweb.has_template("t"));

    qweb.add_template("t", "<t></t>").unwrap();
    let err = qweb.add_template("t", "<div/>").unwrap_err();
    assert_eq!(err.to_string(), "Template 't' already defined");
}

// -----------------------------------------------------------------------------
//   - Properties -
// -----------------------------------------------------------------------------
#[test]
fn keyed_permutation_preserves_node_identity() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.add_template(
        "list",
        r#"<ul><li t-foreach="items" t-as="item" t-key="item" t-esc="item"/></ul>"#,
    )?;

    let render = |qweb: &QWeb, items: Vec<Value>| {
        let ctx = Context::new().with_value("items", items);
        qweb.render("list", &ctx, &mut Extra::new())
    };

    let mut doc = Document::new();
    let root = doc.root();
    let mut old = render(&qweb, vec![1.into(), 2.into(), 3.into()])?;
    mount(&mut doc, &mut NoHooks, root, &mut old);

    let ul = old.elm().expect("mounted");
    let before: Vec<NodeId> = doc.children(ul).to_vec();

    let mut new = render(&qweb, vec![3.into(), 1.into(), 2.into()])?;
    patch(&mut doc, &mut NoHooks, old, &mut new);

    assert_eq!(doc.text_content(ul), "312");
    let after: Vec<NodeId> = doc.children(ul).to_vec();
    assert_eq!(after, [before[2], before[0], before[1]]);

    // the key map survives in the vnode model too
    let VNode::Element(ul_node) = &new else { panic!() };
    assert_eq!(
        ul_node.children.iter().filter_map(|c| match c {
            VNode::Element(li) => li.key.clone(),
            _ => None,
        }).collect::<Vec<_>>(),
        [Key::Int(3), Key::Int(1), Key::Int(2)]
    );
    Ok(())
}

#[test]
fn patching_an_identical_render_is_a_noop() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.add_template("t", r#"<div class="a"><span t-esc="x"/></div>"#)?;

    let ctx = Context::new().with_value("x", 1);
    let mut doc = Document::new();
    let root = doc.root();

    let mut old = qweb.render("t", &ctx, &mut Extra::new())?;
    mount(&mut doc, &mut NoHooks, root, &mut old);

    let mut new = qweb.render("t", &ctx, &mut Extra::new())?;
    let before = doc.mutations();
    patch(&mut doc, &mut NoHooks, old, &mut new);
    assert_eq!(doc.mutations(), before);
    Ok(())
}

#[test]
fn render_is_stable_for_a_context() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.add_template("t", r#"<p t-att-data-n="n">[<t t-esc="n"/>]</p>"#)?;

    let ctx = Context::new().with_value("n", 4);
    let a = qweb.render("t", &ctx, &mut Extra::new())?;
    let b = qweb.render("t", &ctx, &mut Extra::new())?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn unknown_template_render_fails() {
    let qweb = QWeb::new();
    let err = qweb.render("ghost", &Context::new(), &mut Extra::new()).unwrap_err();
    assert_eq!(err, TemplateError::Render(RenderError::UnknownTemplate("ghost".into())));
}

#[test]
fn mount_then_destroy_leaves_the_document_clean() -> Result<()> {
    let mut app = App::new();
    app.qweb_mut().add_template(
        "counter",
        r#"<div><t t-esc="state.counter"/><button t-on-click="inc">Inc</button></div>"#,
    )?;

    let id = app.create(Counter);
    app.mount(id, app.root())?;
    assert_ne!(app.document().inner_html(app.root()), "");

    app.destroy(id);
    assert_eq!(app.document().inner_html(app.root()), "");

    // destroy twice is a no-op
    app.destroy(id);
    assert!(app.is_destroyed(id));
    Ok(())
}

#[test]
fn updates_coalesce_to_one_render_per_flush() -> Result<()> {
    let mut app = App::new();
    app.qweb_mut().add_template(
        "counter",
        r#"<div><t t-esc="state.counter"/><button t-on-click="inc">Inc</button></div>"#,
    )?;

    let id = app.create(Counter);
    app.mount(id, app.root())?;

    let renders_before = app.document().mutations();
    app.update_state(id, record! { "counter" => 5 });
    app.update_state(id, record! { "counter" => 6 });
    app.update_state(id, record! { "counter" => 7 });
    app.flush()?;

    // one text write: the three patches merged into a single render
    assert_eq!(app.document().mutations(), renders_before + 1);
    assert_eq!(app.document().inner_html(app.root()), "<div>7<button>Inc</button></div>");
    Ok(())
}

#[test]
fn bundles_register_multiple_templates() -> Result<()> {
    let mut qweb = QWeb::new();
    qweb.load_templates(
        r#"<templates>
            <t t-name="alpha"><p>a</p></t>
            <div t-name="beta">b</div>
        </templates>"#,
    )?;

    assert!(qweb.has_template("alpha"));
    assert!(qweb.has_template("beta"));
    Ok(())
}
