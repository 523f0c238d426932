use std::cell::Cell;
use std::collections::HashMap;

use weft_vdom::VNode;

use crate::compiler;
use crate::directives::{self, Directive};
use crate::error::{Error, RenderError, Result};
use crate::markup::{self, MarkupNode};
use crate::program::Program;
use crate::render::{Context, Executor, Extra};

/// An immutable compiled template.
#[derive(Debug)]
pub struct Template {
    name: String,
    program: Program,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The template compilation environment: a name to template map, the
/// priority-ordered directive registry and an id source for generated
/// identifiers.
pub struct QWeb {
    templates: HashMap<String, Template>,
    directives: Vec<Directive>,
    next_id: Cell<u64>,
}

impl QWeb {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            directives: directives::default_directives(),
            next_id: Cell::new(1),
        }
    }

    /// Compile and register a template. A failed compilation leaves the
    /// template map untouched.
    pub fn add_template(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let name = name.into();
        if self.templates.contains_key(&name) {
            return Err(Error::Conflict(name));
        }

        let root = markup::parse_document(source)?;
        let program = compiler::compile(&name, source, &root, &self.directives)?;
        self.templates.insert(name.clone(), Template { name, program });
        Ok(())
    }

    /// Register every `t-name` carrying element of a bundle document.
    /// The whole bundle registers atomically: any failure leaves the
    /// template map unchanged.
    pub fn load_templates(&mut self, bundle: &str) -> Result<()> {
        let root = markup::parse_document(bundle)?;

        let mut staged: Vec<Template> = vec![];
        for child in &root.children {
            let MarkupNode::Element(el) = child else { continue };
            let Some(name) = el.attr("t-name") else { continue };

            if self.templates.contains_key(name) || staged.iter().any(|t| t.name == name) {
                return Err(Error::Conflict(name.to_string()));
            }

            let program = compiler::compile(name, bundle, el, &self.directives)?;
            staged.push(Template {
                name: name.to_string(),
                program,
            });
        }

        for template in staged {
            self.templates.insert(template.name.clone(), template);
        }
        Ok(())
    }

    /// Render a template to its root vnode.
    pub fn render(&self, name: &str, ctx: &Context, extra: &mut Extra) -> Result<VNode> {
        let Some(template) = self.templates.get(name) else {
            return Err(RenderError::UnknownTemplate(name.to_string()).into());
        };

        let mut executor = Executor::new(self, ctx, extra, &template.program);
        let mut out = vec![];
        executor.exec_ops(&template.program.root, &mut out)?;

        match out.len() {
            1 => Ok(out.remove(0)),
            0 => Err(RenderError::EmptyRender(name.to_string()).into()),
            _ => Err(RenderError::MultipleRoots.into()),
        }
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// The registered templates, in no particular order.
    pub fn templates(&self) -> impl Iterator<Item = &Template> + '_ {
        self.templates.values()
    }

    /// Monotonically increasing identifier source.
    pub fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub(crate) fn program(&self, name: &str) -> Option<&Program> {
        self.templates.get(name).map(|template| &template.program)
    }
}
