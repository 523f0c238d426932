use std::collections::HashMap;

use crate::widget::Widget;

type WidgetFactory = Box<dyn Fn() -> Box<dyn Widget>>;

/// Widget constructors by name, resolved when `t-widget` expressions
/// name a child widget.
pub struct Factory {
    factories: HashMap<String, WidgetFactory>,
}

impl Factory {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<W, F>(&mut self, name: impl Into<String>, factory: F)
    where
        W: Widget,
        F: Fn() -> W + 'static,
    {
        self.factories
            .insert(name.into(), Box::new(move || Box::new(factory())));
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn Widget>> {
        Some(self.factories.get(name)?())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
